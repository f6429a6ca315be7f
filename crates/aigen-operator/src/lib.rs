pub mod app;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use domain::crd;
pub use domain::dispatcher;
pub use domain::reconciler;
pub use infrastructure::k8s;
pub use infrastructure::kube_client;
