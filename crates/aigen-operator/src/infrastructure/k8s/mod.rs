//! Kubernetes integration module.
//!
//! The main components are:
//! - [`NodeWatcher`]: reports node additions, updates and deletions
//! - [`AIGenWatcher`]: reports `AIGen` creation, spec changes and deletion
//! - [`Trigger`]: what both watchers (and the resync timer) send to the dispatcher

pub mod aigen_watcher;
pub mod node_watcher;
pub mod types;

pub use aigen_watcher::AIGenWatcher;
pub use node_watcher::NodeWatcher;
pub use types::KubernetesError;
pub use types::Trigger;
