use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::watcher::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::watcher::Event;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::infrastructure::k8s::types::KubernetesError;
use crate::infrastructure::k8s::types::Trigger;

/// Watches cluster nodes and reports every change, deletions included.
pub struct NodeWatcher {
    client: Client,
}

impl NodeWatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Runs until cancelled, restarting the watch stream whenever it fails.
    #[tracing::instrument(skip_all)]
    pub async fn run(
        &self,
        sender: mpsc::Sender<Trigger>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting node watcher");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Node watcher shutdown requested");
                    break;
                }
                result = self.watch_nodes(&sender) => {
                    match result {
                        Ok(()) => {
                            warn!("Node watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) => {
                            error!("Node watch failed: {e:?}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn watch_nodes(&self, sender: &mpsc::Sender<Trigger>) -> Result<(), Report<KubernetesError>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let mut stream = watcher(api, Config::default()).boxed();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| {
                Report::new(KubernetesError::WatchFailed {
                    resource: "nodes".to_string(),
                    message: format!("Watch stream error: {e}"),
                })
            })?;

            if sender.send(node_trigger(&event)).await.is_err() {
                warn!("Trigger receiver dropped, stopping node watch");
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Every node event, deletions and relists included, can flip the GPU verdict.
pub(crate) fn node_trigger(event: &Event<Node>) -> Trigger {
    match event {
        Event::Applied(node) => debug!("Node applied: {}", node.name_any()),
        Event::Deleted(node) => info!("Node deleted: {}", node.name_any()),
        Event::Restarted(nodes) => debug!("Node watch restarted with {} nodes", nodes.len()),
    }
    Trigger::NodesChanged
}
