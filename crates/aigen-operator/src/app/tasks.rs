use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::app::core::Application;
use crate::infrastructure::k8s::Trigger;

const TRIGGER_CHANNEL_CAPACITY: usize = 256;

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token,
        }
    }

    /// Wires the node watcher, the AIGen watcher and the resync timer into one
    /// trigger channel consumed by the dispatcher.
    pub fn spawn_all_tasks(&mut self, app: &Application) -> Result<()> {
        let (trigger_sender, trigger_receiver) = mpsc::channel::<Trigger>(TRIGGER_CHANNEL_CAPACITY);

        let node_watcher_task = self.spawn_node_watcher_task(app, trigger_sender.clone());
        self.tasks.push(node_watcher_task);

        let aigen_watcher_task = self.spawn_aigen_watcher_task(app, trigger_sender.clone());
        self.tasks.push(aigen_watcher_task);

        let resync_task = self.spawn_resync_task(app.args().reconcile_interval(), trigger_sender);
        self.tasks.push(resync_task);

        let dispatcher_task =
            self.spawn_dispatcher_task(app, trigger_receiver, app.args().shutdown_timeout());
        self.tasks.push(dispatcher_task);

        Ok(())
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self, shutdown_timeout: Duration) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                self.cancellation_token.cancel();
                self.wait_for_tasks_with_timeout(shutdown_timeout).await;
            }
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                self.cancellation_token.cancel();
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly");
            }
        }

        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_node_watcher_task(
        &self,
        app: &Application,
        sender: mpsc::Sender<Trigger>,
    ) -> JoinHandle<()> {
        let node_watcher = app.services().node_watcher.clone();
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tracing::info!("Starting node watcher task");
            if let Err(e) = node_watcher.run(sender, token).await {
                tracing::error!("Node watcher failed: {e:?}");
            } else {
                tracing::info!("Node watcher completed");
            }
        })
    }

    fn spawn_aigen_watcher_task(
        &self,
        app: &Application,
        sender: mpsc::Sender<Trigger>,
    ) -> JoinHandle<()> {
        let aigen_watcher = app.services().aigen_watcher.clone();
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tracing::info!("Starting AIGen watcher task");
            if let Err(e) = aigen_watcher.run(sender, token).await {
                tracing::error!("AIGen watcher failed: {e:?}");
            } else {
                tracing::info!("AIGen watcher completed");
            }
        })
    }

    fn spawn_resync_task(&self, period: Duration, sender: mpsc::Sender<Trigger>) -> JoinHandle<()> {
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tracing::info!("Starting periodic resync every {period:?}");
            run_resync_timer(period, sender, token).await;
            tracing::info!("Periodic resync task completed");
        })
    }

    fn spawn_dispatcher_task(
        &self,
        app: &Application,
        receiver: mpsc::Receiver<Trigger>,
        shutdown_timeout: Duration,
    ) -> JoinHandle<()> {
        let dispatcher = app.services().dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.run(receiver, shutdown_timeout).await;
            tracing::info!("Dispatcher task completed");
        })
    }
}

/// Sends [`Trigger::Tick`] every `period`, starting one period from now.
async fn run_resync_timer(
    period: Duration,
    sender: mpsc::Sender<Trigger>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if sender.send(Trigger::Tick).await.is_err() {
                    tracing::warn!("Trigger receiver dropped, stopping periodic resync");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn resync_timer_ticks_after_each_period() {
        let (sender, mut receiver) = mpsc::channel(8);
        let token = CancellationToken::new();
        let timer = tokio::spawn(run_resync_timer(
            Duration::from_secs(60),
            sender,
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(receiver.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(receiver.try_recv().ok(), Some(Trigger::Tick));
        assert_eq!(receiver.try_recv().ok(), Some(Trigger::Tick));

        token.cancel();
        timer.await.unwrap();
    }
}
