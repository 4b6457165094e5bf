use async_trait::async_trait;

/// Cloud Map / service-discovery collaborator (spec.md §6, §4.3). Invoked by
/// `TaskUpdater` when a task transitions to RUNNING, mirroring ECS's own
/// registration of a task's IP with its service's Cloud Map namespace once
/// it becomes reachable.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn register(&self, task_arn: &str, pod_ip: Option<&str>) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct LocalServiceDiscovery;

#[async_trait]
impl ServiceDiscovery for LocalServiceDiscovery {
    async fn register(&self, task_arn: &str, pod_ip: Option<&str>) -> anyhow::Result<()> {
        tracing::debug!(task_arn, pod_ip, "service-discovery registration (structural no-op)");
        Ok(())
    }
}
