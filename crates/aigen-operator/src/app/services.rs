use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::dispatcher::EventDispatcher;
use crate::infrastructure::k8s::AIGenWatcher;
use crate::infrastructure::k8s::NodeWatcher;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub dispatcher: EventDispatcher,
    pub node_watcher: Arc<NodeWatcher>,
    pub aigen_watcher: Arc<AIGenWatcher>,
    /// Shared by the dispatcher and every background task.
    pub cancellation_token: CancellationToken,
}
