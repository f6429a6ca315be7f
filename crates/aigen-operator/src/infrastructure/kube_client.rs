use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use crate::infrastructure::k8s::KubernetesError;

/// Builds a client from an explicit kubeconfig, or the in-cluster/default config.
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<KubernetesError>> {
    let config = match kubeconfig.as_deref() {
        Some(path) => config_from_file(path).await?,
        None => Config::infer()
            .await
            .change_context(connection_failed(
                "no kubeconfig given and neither in-cluster nor local config found",
            ))?,
    };
    tracing::info!("Using Kubernetes API server {}", config.cluster_url);

    Client::try_from(config).change_context(connection_failed("cannot build Kubernetes client"))
}

async fn config_from_file(path: &Path) -> Result<Config, Report<KubernetesError>> {
    let kubeconfig = Kubeconfig::read_from(path)
        .change_context(connection_failed(format!("cannot read kubeconfig {}", path.display())))?;

    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context(connection_failed(format!(
            "kubeconfig {} has no usable context",
            path.display()
        )))
}

fn connection_failed(message: impl Into<String>) -> KubernetesError {
    KubernetesError::ConnectionFailed {
        message: message.into(),
    }
}

/// Confirms the API server answers before any watcher starts.
pub async fn check_connectivity(client: &Client) -> Result<String, Report<KubernetesError>> {
    let info = client
        .apiserver_version()
        .await
        .change_context(connection_failed("Kubernetes API server did not answer /version"))?;
    Ok(info.git_version)
}
