//! Trigger fan-out, coalescing and per-`AIGen` serialization
//!
//! Every trigger source (node watch, `AIGen` watch, resync timer) ends up in
//! [`EventDispatcher::dispatch`]. A key is in one of three places:
//!
//! - queued: waiting out the debounce window or the previous pass; further triggers
//!   for the key are absorbed,
//! - running: holds the key's lock; a new trigger queues exactly one follow-up pass,
//! - idle.
//!
//! Retryable failures re-queue the key with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::DashSet;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use utils::keyed_lock::KeyedAsyncLock;

use crate::domain::crd::AIGenKey;
use crate::domain::traits::ReconcileHandler;
use crate::infrastructure::k8s::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Quiet period before a queued key starts.
    pub debounce: Duration,
    /// First retry delay, doubled on every consecutive failure.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl DispatcherSettings {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

struct Inner {
    handler: Arc<dyn ReconcileHandler>,
    settings: DispatcherSettings,
    locks: KeyedAsyncLock<AIGenKey>,
    queued: DashSet<AIGenKey>,
    known: DashSet<AIGenKey>,
    attempts: DashMap<AIGenKey, u32>,
    tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    pub fn new(
        handler: Arc<dyn ReconcileHandler>,
        settings: DispatcherSettings,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                settings,
                locks: KeyedAsyncLock::new(),
                queued: DashSet::new(),
                known: DashSet::new(),
                attempts: DashMap::new(),
                tracker: TaskTracker::new(),
                cancellation_token,
            }),
        }
    }

    /// Consumes triggers until cancelled or every sender is gone, then waits for
    /// in-flight passes.
    pub async fn run(&self, mut receiver: mpsc::Receiver<Trigger>, shutdown_timeout: Duration) {
        info!("Starting event dispatcher");
        let token = self.inner.cancellation_token.clone();

        loop {
            select! {
                _ = token.cancelled() => {
                    info!("Event dispatcher shutdown requested");
                    break;
                }
                trigger = receiver.recv() => {
                    match trigger {
                        Some(trigger) => self.dispatch(trigger),
                        None => {
                            info!("Trigger channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.drain(shutdown_timeout).await;
    }

    /// Routes one trigger to the keys it affects.
    pub fn dispatch(&self, trigger: Trigger) {
        let debounce = self.inner.settings.debounce;
        match trigger {
            Trigger::NodesChanged | Trigger::Tick => {
                let keys: Vec<AIGenKey> = self.inner.known.iter().map(|k| k.clone()).collect();
                debug!("{trigger:?} affects {} AIGen(s)", keys.len());
                for key in keys {
                    self.enqueue(key, debounce);
                }
            }
            Trigger::AIGenApplied(key) => {
                self.inner.known.insert(key.clone());
                self.enqueue(key, debounce);
            }
            Trigger::AIGenDeleted(key) => {
                info!("AIGen {key} deleted, forgetting it");
                self.inner.known.remove(&key);
                self.inner.attempts.remove(&key);
            }
            Trigger::AIGenResync(keys) => {
                self.inner.known.retain(|known| keys.contains(known));
                self.inner.attempts.retain(|known, _| keys.contains(known));
                for key in keys {
                    self.inner.known.insert(key.clone());
                    self.enqueue(key, debounce);
                }
            }
        }
    }

    /// Keys the dispatcher currently reconciles.
    pub fn known_keys(&self) -> Vec<AIGenKey> {
        let mut keys: Vec<AIGenKey> = self.inner.known.iter().map(|k| k.clone()).collect();
        keys.sort();
        keys
    }

    /// Stops accepting work and waits for queued and running passes.
    pub async fn drain(&self, timeout: Duration) {
        self.inner.tracker.close();
        if tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Reconciliations still running after {timeout:?} ({} AIGen(s) locked), giving up on them",
                self.inner.locks.len()
            );
        } else if !self.inner.locks.is_empty() {
            debug!("{} AIGen lock(s) still referenced after drain", self.inner.locks.len());
        }
    }

    fn enqueue(&self, key: AIGenKey, delay: Duration) {
        if !self.inner.queued.insert(key.clone()) {
            debug!("{key} already queued, coalescing trigger");
            return;
        }

        let this = self.clone();
        self.inner.tracker.spawn(async move {
            this.process(key, delay).await;
        });
    }

    async fn process(&self, key: AIGenKey, delay: Duration) {
        let inner = &self.inner;

        select! {
            _ = inner.cancellation_token.cancelled() => {
                inner.queued.remove(&key);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if inner.locks.is_contended(&key) {
            debug!("{key} is still being reconciled, waiting for that pass to finish");
        }
        let guard = inner.locks.lock(&key).await;
        inner.queued.remove(&key);

        if inner.cancellation_token.is_cancelled() {
            debug!("Shutting down, not starting {key}");
            return;
        }
        if !inner.known.contains(&key) {
            debug!("{key} was deleted while queued, skipping");
            return;
        }

        let result = inner.handler.handle(guard.key()).await;
        drop(guard);

        match result {
            Ok(()) => {
                inner.attempts.remove(&key);
            }
            Err(report) if report.current_context().is_retryable() => {
                let attempt = {
                    let mut attempts = inner.attempts.entry(key.clone()).or_insert(0);
                    *attempts += 1;
                    *attempts
                };
                let delay = inner.settings.backoff(attempt);
                warn!("Reconciliation of {key} failed (attempt {attempt}), retrying in {delay:?}: {report:?}");
                if !inner.cancellation_token.is_cancelled() && inner.known.contains(&key) {
                    self.enqueue(key, delay);
                }
            }
            Err(report) => {
                inner.attempts.remove(&key);
                error!("Reconciliation of {key} failed and will not be retried before the next trigger: {report:?}");
            }
        }
    }
}
