//! Decision engine mapping cluster state and an `AIGen` spec to a scaling action

use crate::domain::classifier::Tier;
use crate::domain::cluster_state::ClusterState;
use crate::domain::crd::AIGenSpec;

pub const REASON_GPU_DETECTED: &str = "GPU nodes detected";
pub const REASON_NO_GPU: &str = "No GPU nodes available";

/// An `AIGenSpec` that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSpec {
    pub target_namespace: String,
    pub cpu_deployment: String,
    pub gpu_deployment: String,
    pub replicas: i32,
}

impl ValidatedSpec {
    /// Checks required fields and replica bounds.
    ///
    /// Returns every problem found, joined, so the user sees them at once.
    pub fn validate(spec: &AIGenSpec) -> Result<Self, String> {
        let mut problems = Vec::new();

        let mut required = |field: &str, value: &Option<String>| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    problems.push(format!("spec.{field} is required"));
                    String::new()
                }
            }
        };

        let target_namespace = required("targetNamespace", &spec.target_namespace);
        let cpu_deployment = required("cpuDeployment", &spec.cpu_deployment);
        let gpu_deployment = required("gpuDeployment", &spec.gpu_deployment);

        let replicas = spec.replicas.unwrap_or(1);
        if replicas < 0 {
            problems.push(format!("spec.replicas must be >= 0, got {replicas}"));
        }
        if !cpu_deployment.is_empty() && cpu_deployment == gpu_deployment {
            problems.push("spec.cpuDeployment and spec.gpuDeployment must differ".to_string());
        }

        if problems.is_empty() {
            Ok(Self {
                target_namespace,
                cpu_deployment,
                gpu_deployment,
                replicas,
            })
        } else {
            Err(problems.join("; "))
        }
    }

    pub fn deployment_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Gpu => &self.gpu_deployment,
            Tier::Cpu => &self.cpu_deployment,
        }
    }
}

/// What the reconciler should do with the deployment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAction {
    /// Scale `tier` to `replicas` and the other tier to zero.
    Activate {
        tier: Tier,
        replicas: i32,
        reason: String,
    },
    /// Both deployments already match the desired counts.
    NoChange { tier: Tier, reason: String },
}

impl TargetAction {
    pub fn tier(&self) -> Tier {
        match self {
            TargetAction::Activate { tier, .. } | TargetAction::NoChange { tier, .. } => *tier,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            TargetAction::Activate { reason, .. } | TargetAction::NoChange { reason, .. } => reason,
        }
    }

    /// Desired replica counts for the active and the inactive deployment.
    pub fn scale_plan(&self, spec: &ValidatedSpec) -> ScalePlan {
        let tier = self.tier();
        let inactive = match tier {
            Tier::Gpu => Tier::Cpu,
            Tier::Cpu => Tier::Gpu,
        };
        ScalePlan {
            active: ScaleTarget {
                deployment: spec.deployment_for(tier).to_string(),
                replicas: spec.replicas,
            },
            inactive: ScaleTarget {
                deployment: spec.deployment_for(inactive).to_string(),
                replicas: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleTarget {
    pub deployment: String,
    pub replicas: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalePlan {
    pub active: ScaleTarget,
    pub inactive: ScaleTarget,
}

/// Replica counts currently set on the two deployments, `None` when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservedReplicas {
    pub active: Option<i32>,
    pub inactive: Option<i32>,
}

pub struct DecisionEngine;

impl DecisionEngine {
    /// GPU presence is the only switch signal: any GPU node activates the GPU tier,
    /// whatever the CPU node count. An empty cluster falls to the CPU tier.
    pub fn decide(state: &ClusterState, spec: &ValidatedSpec) -> TargetAction {
        if state.gpu_node_count > 0 {
            TargetAction::Activate {
                tier: Tier::Gpu,
                replicas: spec.replicas,
                reason: REASON_GPU_DETECTED.to_string(),
            }
        } else {
            TargetAction::Activate {
                tier: Tier::Cpu,
                replicas: spec.replicas,
                reason: REASON_NO_GPU.to_string(),
            }
        }
    }

    /// Downgrades an action to `NoChange` when the observed counts already match it.
    pub fn refine(
        action: TargetAction,
        spec: &ValidatedSpec,
        observed: ObservedReplicas,
    ) -> TargetAction {
        let plan = action.scale_plan(spec);
        let settled = observed.active == Some(plan.active.replicas)
            && observed.inactive == Some(plan.inactive.replicas);

        match action {
            TargetAction::Activate { tier, reason, .. } if settled => {
                TargetAction::NoChange { tier, reason }
            }
            other => other,
        }
    }
}
