//! Kubernetes client builder with kubeconfig and context support.

use std::path::Path;

use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::error::KhError;

/// Build a Kubernetes client for one context.
///
/// With neither an explicit kubeconfig nor a context, falls back to the
/// standard discovery (`KUBECONFIG`, `~/.kube/config`, in-cluster).
pub async fn build_client(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
) -> Result<kube::Client, KhError> {
    if kubeconfig.is_none() && context.is_none() {
        debug!("Using default kubeconfig context");
        return kube::Client::try_default()
            .await
            .map_err(|e| KhError::Kubeconfig(e.to_string()));
    }

    let label = context.unwrap_or("current");
    debug!("Using kubeconfig context: {}", label);

    let kubeconfig = read_kubeconfig(kubeconfig)?;
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| KhError::Kubeconfig(format!("context '{}': {}", label, e)))?;

    kube::Client::try_from(config)
        .map_err(|e| KhError::Kubeconfig(format!("context '{}': {}", label, e)))
}

/// Ask the API server for its version. Any failure means the cluster is unreachable.
pub async fn probe(client: &kube::Client, context: &str) -> Result<String, KhError> {
    let info = client
        .apiserver_version()
        .await
        .map_err(|e| KhError::Connection {
            context: context.to_string(),
            message: e.to_string(),
        })?;
    debug!("[{}] API server version {}", context, info.git_version);
    Ok(info.git_version)
}

/// Name of the context that will be used.
pub fn current_context(kubeconfig: Option<&Path>, context: Option<&str>) -> String {
    if let Some(ctx) = context {
        return ctx.to_string();
    }

    read_kubeconfig(kubeconfig)
        .ok()
        .and_then(|kc| kc.current_context)
        .unwrap_or_else(|| "unknown".to_string())
}

fn read_kubeconfig(path: Option<&Path>) -> Result<Kubeconfig, KhError> {
    match path {
        Some(path) => Kubeconfig::read_from(path)
            .map_err(|e| KhError::Kubeconfig(format!("{}: {}", path.display(), e))),
        None => Kubeconfig::read().map_err(|e| KhError::Kubeconfig(e.to_string())),
    }
}
