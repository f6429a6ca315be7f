//! `AIGen` custom resource (`infra.whiz.ai/v1`).

use std::fmt;

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

pub const CRD_GROUP: &str = "infra.whiz.ai";
pub const CRD_VERSION: &str = "v1";
pub const CRD_PLURAL: &str = "aigens";

/// Field manager used for every write the controller issues.
pub const FIELD_MANAGER: &str = "aigen-operator";

/// Type of the single condition kept in [`AIGenStatus::conditions`].
pub const READY_CONDITION: &str = "Ready";

fn default_replicas() -> Option<i32> {
    Some(1)
}

/// Desired state of the CPU/GPU deployment pair.
///
/// Names are optional on the Rust side so an incomplete object can still be read
/// and rejected with a status condition instead of failing deserialization.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "infra.whiz.ai",
    version = "v1",
    kind = "AIGen",
    plural = "aigens",
    shortname = "aigen",
    namespaced,
    status = "AIGenStatus",
    printcolumn = r#"{"name":"Active","type":"string","jsonPath":".status.activeDeployment"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AIGenSpec {
    /// Namespace holding both deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_deployment: Option<String>,
    /// Replica count of whichever tier is active.
    #[serde(default = "default_replicas", skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Observed state written back after every pass.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AIGenStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// RFC 3339 UTC timestamp of the last pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<AIGenCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AIGenCondition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True" or "False"
    pub status: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: String,
}

impl AIGenStatus {
    pub fn ready_condition(&self) -> Option<&AIGenCondition> {
        self.conditions.iter().find(|c| c.type_ == READY_CONDITION)
    }

    /// True when the Ready condition reports `reason` for `generation`.
    pub fn failed_with(&self, reason: &str, generation: Option<i64>) -> bool {
        self.observed_generation == generation
            && self
                .ready_condition()
                .is_some_and(|c| c.status == "False" && c.reason == reason)
    }
}

/// Identity of one `AIGen` object; the unit of serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AIGenKey {
    pub namespace: String,
    pub name: String,
}

impl AIGenKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource(cr: &AIGen) -> Self {
        Self::new(cr.namespace().unwrap_or_default(), cr.name_any())
    }
}

impl fmt::Display for AIGenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
