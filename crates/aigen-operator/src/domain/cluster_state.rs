use k8s_openapi::api::core::v1::Node;

use crate::domain::classifier::NodeClassifier;
use crate::domain::classifier::Tier;

/// Point-in-time node counts per tier.
///
/// Cordoned or unschedulable nodes are counted like any other node: the decision
/// follows node presence, not schedulability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterState {
    pub gpu_node_count: usize,
    pub cpu_node_count: usize,
}

impl ClusterState {
    pub fn from_nodes(nodes: &[Node]) -> Self {
        nodes
            .iter()
            .fold(Self::default(), |mut state, node| {
                match NodeClassifier::classify(node) {
                    Tier::Gpu => state.gpu_node_count += 1,
                    Tier::Cpu => state.cpu_node_count += 1,
                }
                state
            })
    }

    pub fn total(&self) -> usize {
        self.gpu_node_count + self.cpu_node_count
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::NodeSpec;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::domain::classifier::tests::cpu_node;
    use crate::domain::classifier::tests::gpu_node;

    #[test]
    fn counts_each_tier() {
        let nodes = vec![cpu_node("a"), gpu_node("b"), cpu_node("c")];
        let state = ClusterState::from_nodes(&nodes);

        assert_eq!(
            state,
            ClusterState {
                gpu_node_count: 1,
                cpu_node_count: 2,
            }
        );
        assert_eq!(state.total(), 3);
    }

    #[test]
    fn empty_cluster_has_zero_counts() {
        assert_eq!(ClusterState::from_nodes(&[]), ClusterState::default());
    }

    #[test]
    fn cordoned_nodes_are_counted() {
        let mut cordoned = gpu_node("cordoned");
        cordoned.spec = Some(NodeSpec {
            unschedulable: Some(true),
            ..Default::default()
        });

        let state = ClusterState::from_nodes(&[cordoned]);
        assert_eq!(state.gpu_node_count, 1);
    }
}
