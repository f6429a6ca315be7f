//! Observe, decide, apply and record for a single `AIGen`.

use core::error::Error;
use std::sync::Arc;

use chrono::SecondsFormat;
use error_stack::Report;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::cluster_state::ClusterState;
use crate::domain::crd::AIGen;
use crate::domain::crd::AIGenCondition;
use crate::domain::crd::AIGenKey;
use crate::domain::crd::AIGenStatus;
use crate::domain::crd::READY_CONDITION;
use crate::domain::decision::DecisionEngine;
use crate::domain::decision::ObservedReplicas;
use crate::domain::decision::ScaleTarget;
use crate::domain::decision::TargetAction;
use crate::domain::decision::ValidatedSpec;
use crate::domain::traits::ClusterApi;
use crate::domain::traits::Clock;
use crate::domain::traits::ReconcileHandler;
use crate::domain::traits::SystemClock;
use crate::infrastructure::k8s::KubernetesError;

pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
pub const REASON_DEPLOYMENT_NOT_FOUND: &str = "DeploymentNotFound";
pub const REASON_API_REJECTED: &str = "ApiRejected";

#[derive(Debug, derive_more::Display)]
pub enum ReconcileError {
    #[display("Invalid AIGen spec: {message}")]
    InvalidSpec { message: String },
    #[display("Deployment {name} not found in namespace {namespace}")]
    DeploymentNotFound { namespace: String, name: String },
    #[display("Transient Kubernetes API failure: {message}")]
    Transient { message: String },
    #[display("Kubernetes API rejected the request: {message}")]
    Rejected { message: String },
}

impl Error for ReconcileError {}

impl ReconcileError {
    /// Whether the dispatcher should re-queue the key with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::DeploymentNotFound { .. } | ReconcileError::Transient { .. } => true,
            ReconcileError::InvalidSpec { .. } | ReconcileError::Rejected { .. } => false,
        }
    }

    fn from_kubernetes(err: &KubernetesError) -> Self {
        match err {
            KubernetesError::NotFound {
                kind,
                name,
                namespace,
            } if kind == "Deployment" => ReconcileError::DeploymentNotFound {
                namespace: namespace.clone(),
                name: name.clone(),
            },
            other if other.is_retryable() => ReconcileError::Transient {
                message: other.to_string(),
            },
            other => ReconcileError::Rejected {
                message: other.to_string(),
            },
        }
    }
}

fn classify(report: Report<KubernetesError>) -> Report<ReconcileError> {
    let context = ReconcileError::from_kubernetes(report.current_context());
    report.change_context(context)
}

/// Drives the CPU/GPU deployment pair of each `AIGen` towards the decided tier.
///
/// A pass issues at most two scale patches and one status patch, and every scale
/// patch completes before the status is written.
pub struct Reconciler<A: ClusterApi, C: Clock = SystemClock> {
    api: Arc<A>,
    clock: C,
}

impl<A: ClusterApi, C: Clock> Reconciler<A, C> {
    pub fn new(api: Arc<A>, clock: C) -> Self {
        Self { api, clock }
    }

    #[tracing::instrument(skip_all, fields(aigen = %AIGenKey::from_resource(cr)))]
    pub async fn reconcile(&self, cr: &AIGen) -> Result<AIGenStatus, Report<ReconcileError>> {
        let key = AIGenKey::from_resource(cr);

        let spec = match ValidatedSpec::validate(&cr.spec) {
            Ok(spec) => spec,
            Err(message) => return Err(self.reject_spec(cr, &key, message).await),
        };

        match self.apply(cr, &key, &spec).await {
            Ok(status) => Ok(status),
            Err(report) => {
                self.surface_failure(cr, &key, &report).await;
                Err(report)
            }
        }
    }

    /// Scales the pair and writes the success status.
    async fn apply(
        &self,
        cr: &AIGen,
        key: &AIGenKey,
        spec: &ValidatedSpec,
    ) -> Result<AIGenStatus, Report<ReconcileError>> {
        let nodes = self.api.list_nodes().await.map_err(classify)?;
        let state = ClusterState::from_nodes(&nodes);
        let action = DecisionEngine::decide(&state, spec);
        let plan = action.scale_plan(spec);
        info!(
            nodes = state.total(),
            gpu_nodes = state.gpu_node_count,
            cpu_nodes = state.cpu_node_count,
            tier = %action.tier(),
            "{}, activating {}",
            action.reason(),
            plan.active.deployment
        );

        let namespace = spec.target_namespace.as_str();
        let active = self
            .api
            .get_deployment_replicas(namespace, &plan.active.deployment)
            .await;
        let inactive = self
            .api
            .get_deployment_replicas(namespace, &plan.inactive.deployment)
            .await;
        let observed = ObservedReplicas {
            active: active.as_ref().ok().copied(),
            inactive: inactive.as_ref().ok().copied(),
        };
        let action = DecisionEngine::refine(action, spec, observed);

        let mut failure: Option<Report<ReconcileError>> = None;
        if matches!(action, TargetAction::NoChange { .. }) {
            debug!("Deployments already match the desired replica counts");
        } else {
            // active side first, then the inactive side
            for (target, current) in [(&plan.active, active), (&plan.inactive, inactive)] {
                if let Err(report) = self.converge(namespace, target, current).await {
                    let report = classify(report);
                    match failure.as_mut() {
                        Some(first) => first.extend_one(report),
                        None => failure = Some(report),
                    }
                }
            }
        }

        if let Some(report) = failure {
            return Err(report);
        }

        let now = self.now();
        let status = AIGenStatus {
            active_deployment: Some(plan.active.deployment.clone()),
            namespace: Some(spec.target_namespace.clone()),
            replicas: Some(spec.replicas),
            last_sync: Some(now.clone()),
            reason: Some(action.reason().to_string()),
            observed_generation: cr.metadata.generation,
            conditions: vec![ready_condition(
                cr.status.as_ref(),
                true,
                REASON_RECONCILED,
                format!(
                    "{} scaled to {}, {} scaled to 0",
                    plan.active.deployment, spec.replicas, plan.inactive.deployment
                ),
                &now,
            )],
        };

        self.api
            .patch_aigen_status(key, &status)
            .await
            .map_err(classify)?;

        Ok(status)
    }

    /// Writes a failure status for errors a retry alone will not fix.
    ///
    /// A missing deployment anywhere in the report wins over the other contexts;
    /// transient failures leave the last status untouched.
    async fn surface_failure(
        &self,
        cr: &AIGen,
        key: &AIGenKey,
        report: &Report<ReconcileError>,
    ) {
        let contexts: Vec<&ReconcileError> = report
            .frames()
            .filter_map(|frame| frame.downcast_ref::<ReconcileError>())
            .collect();

        let missing = contexts
            .iter()
            .find(|err| matches!(err, ReconcileError::DeploymentNotFound { .. }));
        let rejected = contexts
            .iter()
            .find(|err| matches!(err, ReconcileError::Rejected { .. }));

        if let Some(err) = missing {
            self.record_failure(cr, key, REASON_DEPLOYMENT_NOT_FOUND, err.to_string())
                .await;
        } else if let Some(err) = rejected {
            self.record_failure(cr, key, REASON_API_REJECTED, err.to_string())
                .await;
        }
    }

    /// Patches one deployment unless it already runs `target.replicas`.
    async fn converge(
        &self,
        namespace: &str,
        target: &ScaleTarget,
        current: Result<i32, Report<KubernetesError>>,
    ) -> Result<(), Report<KubernetesError>> {
        let current = current?;
        if current == target.replicas {
            debug!("{} already at {} replicas", target.deployment, current);
            return Ok(());
        }
        info!(
            "Scaling {namespace}/{} from {current} to {}",
            target.deployment, target.replicas
        );
        self.api
            .scale_deployment(namespace, &target.deployment, target.replicas)
            .await
    }

    async fn reject_spec(
        &self,
        cr: &AIGen,
        key: &AIGenKey,
        message: String,
    ) -> Report<ReconcileError> {
        let already_recorded = cr
            .status
            .as_ref()
            .is_some_and(|status| status.failed_with(REASON_INVALID_SPEC, cr.metadata.generation));

        if already_recorded {
            debug!("Invalid spec already recorded for this generation, skipping");
        } else {
            warn!("Rejecting spec of {key}: {message}");
            self.record_failure(cr, key, REASON_INVALID_SPEC, message.clone())
                .await;
        }

        Report::new(ReconcileError::InvalidSpec { message })
    }

    /// Best-effort failure status; deployment fields from the last success are kept.
    async fn record_failure(&self, cr: &AIGen, key: &AIGenKey, reason: &str, message: String) {
        let now = self.now();
        let status = AIGenStatus {
            last_sync: Some(now.clone()),
            reason: Some(message.clone()),
            observed_generation: cr.metadata.generation,
            conditions: vec![ready_condition(
                cr.status.as_ref(),
                false,
                reason,
                message,
                &now,
            )],
            ..Default::default()
        };

        if let Err(e) = self.api.patch_aigen_status(key, &status).await {
            warn!("Failed to record failure status on {key}: {e:?}");
        }
    }

    fn now(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Builds the Ready condition, keeping the transition time while the status holds.
fn ready_condition(
    previous: Option<&AIGenStatus>,
    ready: bool,
    reason: &str,
    message: String,
    now: &str,
) -> AIGenCondition {
    let status = if ready { "True" } else { "False" };
    let last_transition_time = previous
        .and_then(AIGenStatus::ready_condition)
        .filter(|condition| condition.status == status)
        .map(|condition| condition.last_transition_time.clone())
        .unwrap_or_else(|| now.to_string());

    AIGenCondition {
        type_: READY_CONDITION.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: Some(message),
        last_transition_time,
    }
}

#[async_trait::async_trait]
impl<A: ClusterApi, C: Clock> ReconcileHandler for Reconciler<A, C> {
    async fn handle(&self, key: &AIGenKey) -> Result<(), Report<ReconcileError>> {
        match self.api.get_aigen(key).await.map_err(classify)? {
            Some(cr) => self.reconcile(&cr).await.map(|status| {
                debug!("Reconciled {key}: {status:?}");
            }),
            None => {
                debug!("AIGen {key} no longer exists, nothing to do");
                Ok(())
            }
        }
    }
}
