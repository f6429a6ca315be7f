use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app::core::Application;
use crate::app::services::ApplicationServices;
use crate::config::ControllerArgs;
use crate::domain::dispatcher::DispatcherSettings;
use crate::domain::dispatcher::EventDispatcher;
use crate::domain::reconciler::Reconciler;
use crate::domain::traits::ReconcileHandler;
use crate::domain::traits::SystemClock;
use crate::infrastructure::cluster_api::KubeClusterApi;
use crate::infrastructure::k8s::AIGenWatcher;
use crate::infrastructure::k8s::NodeWatcher;
use crate::infrastructure::kube_client::check_connectivity;
use crate::infrastructure::kube_client::init_kube_client;

/// Application builder
pub struct ApplicationBuilder {
    args: ControllerArgs,
}

impl ApplicationBuilder {
    pub fn new(args: ControllerArgs) -> Self {
        Self { args }
    }

    /// Connects to the cluster and wires every component.
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let client = init_kube_client(self.args.kubeconfig.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

        let server_version = check_connectivity(&client)
            .await
            .map_err(|e| anyhow::anyhow!("Kubernetes API server is unreachable: {e:?}"))?;
        tracing::info!("Connected to Kubernetes API server {server_version}");

        let api = Arc::new(KubeClusterApi::new(client.clone()));
        let reconciler = Arc::new(Reconciler::new(api, SystemClock));

        let cancellation_token = CancellationToken::new();
        let settings = DispatcherSettings::from(&self.args);
        tracing::info!(
            "Dispatcher settings: debounce {:?}, backoff {:?} up to {:?}",
            settings.debounce,
            settings.base_backoff,
            settings.max_backoff
        );
        let dispatcher = EventDispatcher::new(
            reconciler as Arc<dyn ReconcileHandler>,
            settings,
            cancellation_token.clone(),
        );

        let node_watcher = Arc::new(NodeWatcher::new(client.clone()));
        let aigen_watcher = Arc::new(AIGenWatcher::new(client, self.args.namespace.clone()));

        let services = ApplicationServices {
            dispatcher,
            node_watcher,
            aigen_watcher,
            cancellation_token,
        };

        Ok(Application::new(services, self.args))
    }
}
