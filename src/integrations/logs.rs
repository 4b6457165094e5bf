use async_trait::async_trait;

/// CloudWatch Logs collaborator (spec.md §6). The translation layer already
/// materializes the `awslogs` sidecar/ConfigMap structurally; this trait is
/// the seam a real deployment would use to also ensure the log group exists
/// before that sidecar starts shipping to it.
#[async_trait]
pub trait Logs: Send + Sync {
    async fn ensure_log_group(&self, group_name: &str, region: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct LocalLogs;

#[async_trait]
impl Logs for LocalLogs {
    async fn ensure_log_group(&self, _group_name: &str, _region: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
