//! GPU/CPU classification of cluster nodes.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Extended resources advertised by GPU device plugins.
pub const GPU_RESOURCE_KEYS: [&str; 3] = ["nvidia.com/gpu", "amd.com/gpu", "intel.com/gpu"];

/// Label set by the NVIDIA GPU feature discovery on GPU hosts.
pub const GPU_PRESENT_LABEL: &str = "nvidia.com/gpu.present";

/// One of the two mutually exclusive deployment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Gpu,
    Cpu,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Gpu => write!(f, "GPU"),
            Tier::Cpu => write!(f, "CPU"),
        }
    }
}

pub struct NodeClassifier;

impl NodeClassifier {
    /// Classifies a node. Anything that is not clearly GPU-capable is CPU.
    pub fn classify(node: &Node) -> Tier {
        if Self::has_gpu_label(node) || Self::has_gpu_resource(node) {
            Tier::Gpu
        } else {
            Tier::Cpu
        }
    }

    fn has_gpu_label(node: &Node) -> bool {
        node.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(GPU_PRESENT_LABEL))
            .is_some_and(|value| value == "true")
    }

    fn has_gpu_resource(node: &Node) -> bool {
        let Some(status) = node.status.as_ref() else {
            return false;
        };
        // allocatable is what the scheduler sees; capacity covers nodes that only report that
        let resources = status.allocatable.as_ref().or(status.capacity.as_ref());
        resources.is_some_and(Self::declares_gpu)
    }

    fn declares_gpu(resources: &BTreeMap<String, Quantity>) -> bool {
        GPU_RESOURCE_KEYS
            .iter()
            .filter_map(|key| resources.get(*key))
            .any(|quantity| gpu_count(quantity) > 0)
    }
}

/// Whole device count of an extended resource; malformed values count as zero.
fn gpu_count(quantity: &Quantity) -> i64 {
    quantity.0.trim().parse::<i64>().unwrap_or(0)
}
