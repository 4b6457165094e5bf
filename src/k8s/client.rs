use std::path::Path;

use anyhow::Context;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

/// Builds a client against the kubeconfig `k3d kubeconfig get` wrote for one
/// ECS cluster's k3d substrate, rather than `Config::infer()`'s single
/// ambient context — KECS talks to as many k3d clusters as there are ECS
/// clusters, so each request needs its own client (spec.md §4.2).
pub async fn client_for_kubeconfig(path: &Path) -> anyhow::Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read kubeconfig at {}", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("failed to build kube client config")?;
    Client::try_from(config).context("failed to build kube client")
}
