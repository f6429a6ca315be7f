//! Seams between the reconciliation core and its collaborators

use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;

use crate::domain::crd::AIGen;
use crate::domain::crd::AIGenKey;
use crate::domain::crd::AIGenStatus;
use crate::domain::reconciler::ReconcileError;
use crate::infrastructure::k8s::KubernetesError;

/// Kubernetes operations the reconciler consumes.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch an `AIGen`; `None` when it no longer exists.
    async fn get_aigen(&self, key: &AIGenKey) -> Result<Option<AIGen>, Report<KubernetesError>>;

    /// List every node of the cluster.
    async fn list_nodes(&self) -> Result<Vec<Node>, Report<KubernetesError>>;

    /// Read `spec.replicas` from a deployment's scale subresource.
    async fn get_deployment_replicas(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<i32, Report<KubernetesError>>;

    /// Patch a deployment's scale subresource.
    async fn scale_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<(), Report<KubernetesError>>;

    /// Merge-patch the status subresource of an `AIGen`.
    async fn patch_aigen_status(
        &self,
        key: &AIGenKey,
        status: &AIGenStatus,
    ) -> Result<(), Report<KubernetesError>>;
}

/// Trait for getting current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Capability the dispatcher drives for each queued key.
#[async_trait::async_trait]
pub trait ReconcileHandler: Send + Sync {
    async fn handle(&self, key: &AIGenKey) -> Result<(), Report<ReconcileError>>;
}
