use async_trait::async_trait;

/// SSM Parameter Store / Secrets Manager collaborator (spec.md §6). Out of
/// scope for materialization: KECS assumes Secrets/ConfigMaps referenced by
/// a container's `secrets` are pre-synced into the cluster by an external
/// process and only references them by name (`pod_template::build_env_from`).
/// This trait is specified so a real deployment has somewhere to plug that
/// sync in — the core does not call it on any request path.
#[async_trait]
pub trait Ssm: Send + Sync {
    async fn resolve_secret(&self, value_from: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Default)]
pub struct LocalSsm;

#[async_trait]
impl Ssm for LocalSsm {
    async fn resolve_secret(&self, value_from: &str) -> anyhow::Result<String> {
        Ok(value_from.to_string())
    }
}
