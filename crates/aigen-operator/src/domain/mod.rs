//! Decision logic for the operator, independent of the Kubernetes client.

pub mod classifier;
pub mod cluster_state;
pub mod crd;
pub mod decision;
pub mod dispatcher;
pub mod reconciler;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
