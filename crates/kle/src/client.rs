//! Kubernetes client construction.

use std::path::Path;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

/// Build a client from `kubeconfig`, or from the in-cluster service account
/// when no path is given.
pub async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to parse kubeconfig file {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("unable to build config from kubeconfig")?
        }
        None => Config::incluster().context("unable to build in cluster config")?,
    };

    Client::try_from(config).context("create kubernetes client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_kubeconfig_is_an_error() {
        let err = kube_client(Some(Path::new("/nonexistent/kle/kubeconfig")))
            .await
            .err()
            .expect("expected an error");
        assert!(err.to_string().contains("failed to parse kubeconfig file"));
    }
}
