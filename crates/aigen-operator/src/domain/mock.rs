//! Test adapters implementing the reconciler's collaborator traits

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use kube::api::ObjectMeta;
use serde_json::Value;

use super::crd::AIGen;
use super::crd::AIGenKey;
use super::crd::AIGenSpec;
use super::crd::AIGenStatus;
use super::traits::ClusterApi;
use super::traits::Clock;
use crate::infrastructure::k8s::KubernetesError;

/// Builds an `AIGen` at generation 1 targeting `serving/llm-cpu` and `serving/llm-gpu`.
pub fn test_aigen(namespace: &str, name: &str, replicas: Option<i32>) -> AIGen {
    AIGen {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: AIGenSpec {
            target_namespace: Some("serving".to_string()),
            cpu_deployment: Some("llm-cpu".to_string()),
            gpu_deployment: Some("llm-gpu".to_string()),
            replicas,
        },
        status: None,
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// In-memory cluster recording every write.
#[derive(Default)]
pub struct MockClusterApi {
    nodes: Mutex<Vec<Node>>,
    aigens: Mutex<HashMap<AIGenKey, AIGen>>,
    deployments: Mutex<HashMap<(String, String), i32>>,
    scale_calls: Mutex<Vec<(String, String, i32)>>,
    status_patches: Mutex<Vec<(AIGenKey, AIGenStatus)>>,
    /// Deployment name to whether its scale failure is retryable.
    failing_deployments: Mutex<HashMap<String, bool>>,
    fail_node_listing: Mutex<bool>,
}

impl MockClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_nodes(&self, nodes: Vec<Node>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    pub fn set_deployment(&self, namespace: &str, name: &str, replicas: i32) {
        self.deployments
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), replicas);
    }

    pub fn deployment_replicas(&self, namespace: &str, name: &str) -> Option<i32> {
        self.deployments
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    pub fn insert_aigen(&self, cr: AIGen) {
        self.aigens
            .lock()
            .unwrap()
            .insert(AIGenKey::from_resource(&cr), cr);
    }

    pub fn stored_status(&self, key: &AIGenKey) -> Option<AIGenStatus> {
        self.aigens
            .lock()
            .unwrap()
            .get(key)
            .and_then(|cr| cr.status.clone())
    }

    /// Make scale patches of `name` fail with a retryable error.
    pub fn fail_scaling(&self, name: &str) {
        self.failing_deployments
            .lock()
            .unwrap()
            .insert(name.to_string(), true);
    }

    /// Make scale patches of `name` fail the way a forbidden request does.
    pub fn reject_scaling(&self, name: &str) {
        self.failing_deployments
            .lock()
            .unwrap()
            .insert(name.to_string(), false);
    }

    pub fn fail_node_listing(&self, enabled: bool) {
        *self.fail_node_listing.lock().unwrap() = enabled;
    }

    pub fn clear_failures(&self) {
        self.failing_deployments.lock().unwrap().clear();
        *self.fail_node_listing.lock().unwrap() = false;
    }

    pub fn scale_calls(&self) -> Vec<(String, String, i32)> {
        self.scale_calls.lock().unwrap().clone()
    }

    pub fn status_patches(&self) -> Vec<(AIGenKey, AIGenStatus)> {
        self.status_patches.lock().unwrap().clone()
    }

    fn not_found(namespace: &str, name: &str) -> Report<KubernetesError> {
        Report::new(KubernetesError::NotFound {
            kind: "Deployment".to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

/// JSON merge patch restricted to what status objects need.
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait::async_trait]
impl ClusterApi for MockClusterApi {
    async fn get_aigen(&self, key: &AIGenKey) -> Result<Option<AIGen>, Report<KubernetesError>> {
        Ok(self.aigens.lock().unwrap().get(key).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, Report<KubernetesError>> {
        if *self.fail_node_listing.lock().unwrap() {
            return Err(Report::new(KubernetesError::RequestFailed {
                message: "node list timed out".to_string(),
                retryable: true,
            }));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn get_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<i32, Report<KubernetesError>> {
        self.deployment_replicas(namespace, name)
            .ok_or_else(|| Self::not_found(namespace, name))
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), Report<KubernetesError>> {
        self.scale_calls
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string(), replicas));

        if let Some(&retryable) = self.failing_deployments.lock().unwrap().get(name) {
            let message = if retryable {
                format!("409 conflict scaling {name}")
            } else {
                format!("403 forbidden scaling {name}")
            };
            return Err(Report::new(KubernetesError::RequestFailed { message, retryable }));
        }

        let mut deployments = self.deployments.lock().unwrap();
        match deployments.get_mut(&(namespace.to_string(), name.to_string())) {
            Some(current) => {
                *current = replicas;
                Ok(())
            }
            None => Err(Self::not_found(namespace, name)),
        }
    }

    async fn patch_aigen_status(
        &self,
        key: &AIGenKey,
        status: &AIGenStatus,
    ) -> Result<(), Report<KubernetesError>> {
        self.status_patches
            .lock()
            .unwrap()
            .push((key.clone(), status.clone()));

        let mut aigens = self.aigens.lock().unwrap();
        let Some(cr) = aigens.get_mut(key) else {
            return Err(Report::new(KubernetesError::NotFound {
                kind: "AIGen".to_string(),
                name: key.name.clone(),
                namespace: key.namespace.clone(),
            }));
        };

        let mut current = serde_json::to_value(cr.status.clone().unwrap_or_default())
            .expect("status serializes");
        let patch = serde_json::to_value(status).expect("status serializes");
        merge(&mut current, &patch);
        cr.status = Some(serde_json::from_value(current).expect("merged status deserializes"));
        Ok(())
    }
}
