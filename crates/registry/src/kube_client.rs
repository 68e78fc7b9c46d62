//! Kubernetes client bootstrap.

use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use crate::k8s::RegistryError;

/// Build a Kubernetes client.
///
/// With an explicit kubeconfig path the client is built from that file;
/// otherwise the default chain applies (in-cluster service account, then
/// `~/.kube/config`).
///
/// # Errors
///
/// - [`RegistryError::ConnectionFailed`] if no usable configuration is found
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<RegistryError>> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .change_context(RegistryError::ConnectionFailed {
                message: "no in-cluster or default kubeconfig available".to_string(),
            });
    };

    let kubeconfig =
        Kubeconfig::read_from(&path).change_context(RegistryError::ConnectionFailed {
            message: format!("failed to read kubeconfig {}", path.display()),
        })?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context(RegistryError::ConnectionFailed {
            message: format!("kubeconfig {} is not usable", path.display()),
        })?;
    Client::try_from(config).change_context(RegistryError::ConnectionFailed {
        message: "failed to build client from kubeconfig".to_string(),
    })
}
