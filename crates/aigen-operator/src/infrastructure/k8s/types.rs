use core::error::Error;

use crate::domain::crd::AIGenKey;

/// Reasons to run a reconciliation, produced by the watchers and the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A node was added, changed or removed; every known `AIGen` is affected.
    NodesChanged,
    /// An `AIGen` was created or its spec changed.
    AIGenApplied(AIGenKey),
    /// An `AIGen` was deleted.
    AIGenDeleted(AIGenKey),
    /// The `AIGen` watch relisted; this is the complete set of objects.
    AIGenResync(Vec<AIGenKey>),
    /// Periodic resync.
    Tick,
}

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch {resource}: {message}")]
    WatchFailed { resource: String, message: String },
    #[display("{kind} not found: {name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },
    #[display("Kubernetes API request failed: {message}")]
    RequestFailed { message: String, retryable: bool },
}

impl Error for KubernetesError {}

impl KubernetesError {
    /// Maps a client error, keeping 404s apart and flagging what is worth retrying.
    pub fn from_kube(err: &kube::Error, kind: &str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 404 => KubernetesError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            kube::Error::Api(response) => KubernetesError::RequestFailed {
                message: format!(
                    "{kind} {namespace}/{name}: {} ({})",
                    response.message, response.code
                ),
                retryable: is_retryable_status(response.code),
            },
            other => KubernetesError::RequestFailed {
                message: format!("{kind} {namespace}/{name}: {other}"),
                retryable: true,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KubernetesError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            KubernetesError::RequestFailed { retryable, .. } => *retryable,
            KubernetesError::NotFound { .. } => false,
            KubernetesError::ConnectionFailed { .. } | KubernetesError::WatchFailed { .. } => true,
        }
    }
}

/// Conflict, throttling, timeouts and server-side failures.
fn is_retryable_status(code: u16) -> bool {
    matches!(code, 408 | 409 | 429) || code >= 500
}

#[cfg(test)]
mod tests {
    use kube::error::ErrorResponse;
    use similar_asserts::assert_eq;

    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_is_kept_apart() {
        let err = KubernetesError::from_kube(&api_error(404), "Deployment", "serving", "llm-cpu");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Deployment not found: llm-cpu in namespace serving"
        );
    }

    #[test]
    fn transient_statuses_are_retryable() {
        for code in [408, 409, 429, 500, 503] {
            let err = KubernetesError::from_kube(&api_error(code), "Deployment", "ns", "d");
            assert!(err.is_retryable(), "{code} should be retryable");
        }
    }

    #[test]
    fn client_errors_are_not_retryable() {
        for code in [400, 403, 422] {
            let err = KubernetesError::from_kube(&api_error(code), "Deployment", "ns", "d");
            assert!(!err.is_retryable(), "{code} should not be retryable");
        }
    }
}
