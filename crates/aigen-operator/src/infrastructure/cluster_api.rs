use error_stack::Report;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::Api;
use kube::Client;
use serde_json::json;
use tracing::debug;
use tracing::info;

use crate::domain::crd::AIGen;
use crate::domain::crd::AIGenKey;
use crate::domain::crd::AIGenStatus;
use crate::domain::crd::FIELD_MANAGER;
use crate::domain::traits::ClusterApi;
use crate::infrastructure::k8s::KubernetesError;

/// [`ClusterApi`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn aigens(&self, namespace: &str) -> Api<AIGen> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

fn report(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Report<KubernetesError> {
    let context = KubernetesError::from_kube(&err, kind, namespace, name);
    Report::new(err).change_context(context)
}

#[async_trait::async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_aigen(&self, key: &AIGenKey) -> Result<Option<AIGen>, Report<KubernetesError>> {
        self.aigens(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| report(e, "AIGen", &key.namespace, &key.name))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, Report<KubernetesError>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| report(e, "Node", "", "*"))?;
        debug!("Listed {} nodes", list.items.len());
        Ok(list.items)
    }

    async fn get_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<i32, Report<KubernetesError>> {
        let scale = self
            .deployments(namespace)
            .get_scale(name)
            .await
            .map_err(|e| report(e, "Deployment", namespace, name))?;
        Ok(scale.spec.and_then(|spec| spec.replicas).unwrap_or(0))
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), Report<KubernetesError>> {
        let body = json!({ "spec": { "replicas": replicas.max(0) } });
        self.deployments(namespace)
            .patch_scale(name, &Self::patch_params(), &Patch::Merge(&body))
            .await
            .map_err(|e| report(e, "Deployment", namespace, name))?;
        info!("Scaled {namespace}/{name} to {replicas}");
        Ok(())
    }

    async fn patch_aigen_status(
        &self,
        key: &AIGenKey,
        status: &AIGenStatus,
    ) -> Result<(), Report<KubernetesError>> {
        // merge patch keeps status fields owned by other managers
        let body = json!({ "status": status });
        self.aigens(&key.namespace)
            .patch_status(&key.name, &Self::patch_params(), &Patch::Merge(&body))
            .await
            .map_err(|e| report(e, "AIGen", &key.namespace, &key.name))?;
        debug!("Updated status of {key}: {status:?}");
        Ok(())
    }
}
