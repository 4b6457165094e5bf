use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::K3dSettings;

/// Shells out to the `k3d` CLI to provision one k3d cluster per ECS cluster
/// (spec.md §4.2 "a Kubernetes substrate per ECS cluster"). Mirrors the
/// teacher's own pattern of driving an external CLI via `Command` rather
/// than linking a client library that doesn't exist for k3d itself.
pub struct K3dProvisioner {
    settings: K3dSettings,
}

impl K3dProvisioner {
    pub fn new(settings: K3dSettings) -> Self {
        Self { settings }
    }

    pub async fn ensure_cli_available(&self) -> Result<()> {
        let output = Command::new("k3d").arg("version").output().await;
        if output.is_err() {
            bail!("k3d CLI not found on PATH; install it from https://k3d.io");
        }
        Ok(())
    }

    pub fn kubeconfig_path(&self, k8s_cluster_name: &str) -> PathBuf {
        PathBuf::from(&self.settings.kubeconfig_dir).join(format!("{k8s_cluster_name}.yaml"))
    }

    /// Creates the k3d cluster if it doesn't already exist, then writes its
    /// kubeconfig to `kubeconfig_path`. Idempotent: `k3d cluster create` on an
    /// existing name is treated as success after checking `cluster list`.
    pub async fn create(&self, k8s_cluster_name: &str) -> Result<PathBuf> {
        if self.exists(k8s_cluster_name).await? {
            debug!(cluster = k8s_cluster_name, "k3d cluster already exists");
        } else {
            info!(cluster = k8s_cluster_name, "creating k3d cluster");
            let status = Command::new("k3d")
                .args(["cluster", "create", k8s_cluster_name])
                .arg("--servers")
                .arg(self.settings.server_count.to_string())
                .arg("--agents")
                .arg(self.settings.agent_count.to_string())
                .arg("--wait")
                .status()
                .await
                .context("failed to spawn k3d cluster create")?;
            if !status.success() {
                bail!("k3d cluster create exited with {status}");
            }
        }

        tokio::fs::create_dir_all(&self.settings.kubeconfig_dir)
            .await
            .context("failed to create kubeconfig directory")?;

        let kubeconfig_path = self.kubeconfig_path(k8s_cluster_name);
        let output = Command::new("k3d")
            .args(["kubeconfig", "get", k8s_cluster_name])
            .output()
            .await
            .context("failed to spawn k3d kubeconfig get")?;
        if !output.status.success() {
            bail!(
                "k3d kubeconfig get failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        tokio::fs::write(&kubeconfig_path, &output.stdout)
            .await
            .context("failed to write kubeconfig")?;

        Ok(kubeconfig_path)
    }

    pub async fn exists(&self, k8s_cluster_name: &str) -> Result<bool> {
        let output = Command::new("k3d")
            .args(["cluster", "list", "--no-headers"])
            .output()
            .await
            .context("failed to spawn k3d cluster list")?;
        if !output.status.success() {
            bail!(
                "k3d cluster list failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .any(|line| line.split_whitespace().next() == Some(k8s_cluster_name)))
    }

    pub async fn delete(&self, k8s_cluster_name: &str) -> Result<()> {
        info!(cluster = k8s_cluster_name, "deleting k3d cluster");
        let status = Command::new("k3d")
            .args(["cluster", "delete", k8s_cluster_name])
            .status()
            .await
            .context("failed to spawn k3d cluster delete")?;
        if !status.success() {
            warn!(cluster = k8s_cluster_name, %status, "k3d cluster delete reported non-zero exit");
        }
        Ok(())
    }
}
