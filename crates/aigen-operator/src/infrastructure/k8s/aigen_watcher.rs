use std::collections::HashMap;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use kube::runtime::watcher::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::watcher::Event;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::crd::AIGen;
use crate::domain::crd::AIGenKey;
use crate::infrastructure::k8s::types::KubernetesError;
use crate::infrastructure::k8s::types::Trigger;

/// Watches `AIGen` objects and turns spec changes into triggers.
pub struct AIGenWatcher {
    client: Client,
    namespace: Option<String>,
}

impl AIGenWatcher {
    /// `namespace` limits the watch; `None` watches all namespaces.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub async fn run(
        &self,
        sender: mpsc::Sender<Trigger>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting AIGen watcher");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("AIGen watcher shutdown requested");
                    break;
                }
                result = self.watch_aigens(&sender) => {
                    match result {
                        Ok(()) => {
                            warn!("AIGen watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) => {
                            error!("AIGen watch failed: {e:?}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn watch_aigens(&self, sender: &mpsc::Sender<Trigger>) -> Result<(), Report<KubernetesError>> {
        let api: Api<AIGen> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut filter = GenerationFilter::default();
        let mut stream = watcher(api, Config::default()).boxed();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| {
                Report::new(KubernetesError::WatchFailed {
                    resource: "aigens".to_string(),
                    message: format!("Watch stream error: {e}"),
                })
            })?;

            let Some(trigger) = filter.translate(event) else {
                continue;
            };
            debug!("AIGen trigger: {trigger:?}");
            if sender.send(trigger).await.is_err() {
                warn!("Trigger receiver dropped, stopping AIGen watch");
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Drops events that leave `metadata.generation` untouched.
///
/// Status writes bump only the resource version, so without this every status
/// update would re-trigger its own reconciliation.
#[derive(Debug, Default)]
pub(crate) struct GenerationFilter {
    seen: HashMap<AIGenKey, Option<i64>>,
}

impl GenerationFilter {
    pub(crate) fn translate(&mut self, event: Event<AIGen>) -> Option<Trigger> {
        match event {
            Event::Applied(cr) => {
                let key = AIGenKey::from_resource(&cr);
                let generation = cr.metadata.generation;
                match self.seen.insert(key.clone(), generation) {
                    Some(previous) if previous == generation => None,
                    _ => Some(Trigger::AIGenApplied(key)),
                }
            }
            Event::Deleted(cr) => {
                let key = AIGenKey::from_resource(&cr);
                self.seen.remove(&key);
                Some(Trigger::AIGenDeleted(key))
            }
            Event::Restarted(crs) => {
                self.seen = crs
                    .iter()
                    .map(|cr| (AIGenKey::from_resource(cr), cr.metadata.generation))
                    .collect();
                let mut keys: Vec<AIGenKey> = self.seen.keys().cloned().collect();
                keys.sort();
                Some(Trigger::AIGenResync(keys))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::api::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::domain::crd::AIGenSpec;

    fn aigen(namespace: &str, name: &str, generation: i64) -> AIGen {
        AIGen {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                generation: Some(generation),
                ..Default::default()
            },
            spec: AIGenSpec::default(),
            status: None,
        }
    }

    #[test]
    fn first_sight_and_spec_changes_trigger() {
        let mut filter = GenerationFilter::default();
        let key = AIGenKey::new("ops", "aigen");

        assert_eq!(
            filter.translate(Event::Applied(aigen("ops", "aigen", 1))),
            Some(Trigger::AIGenApplied(key.clone()))
        );
        assert_eq!(
            filter.translate(Event::Applied(aigen("ops", "aigen", 2))),
            Some(Trigger::AIGenApplied(key))
        );
    }

    #[test]
    fn status_only_updates_are_dropped() {
        let mut filter = GenerationFilter::default();
        filter.translate(Event::Applied(aigen("ops", "aigen", 1)));

        assert_eq!(filter.translate(Event::Applied(aigen("ops", "aigen", 1))), None);
    }

    #[test]
    fn deletion_forgets_generation() {
        let mut filter = GenerationFilter::default();
        let key = AIGenKey::new("ops", "aigen");
        filter.translate(Event::Applied(aigen("ops", "aigen", 1)));

        assert_eq!(
            filter.translate(Event::Deleted(aigen("ops", "aigen", 1))),
            Some(Trigger::AIGenDeleted(key.clone()))
        );
        // recreated with the same generation must trigger again
        assert_eq!(
            filter.translate(Event::Applied(aigen("ops", "aigen", 1))),
            Some(Trigger::AIGenApplied(key))
        );
    }

    #[test]
    fn restart_reports_full_sorted_set() {
        let mut filter = GenerationFilter::default();
        let trigger = filter.translate(Event::Restarted(vec![
            aigen("b", "second", 1),
            aigen("a", "first", 3),
        ]));

        assert_eq!(
            trigger,
            Some(Trigger::AIGenResync(vec![
                AIGenKey::new("a", "first"),
                AIGenKey::new("b", "second"),
            ]))
        );
        assert_eq!(filter.translate(Event::Applied(aigen("a", "first", 3))), None);
    }
}
