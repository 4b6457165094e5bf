use async_trait::async_trait;

/// ELBv2 target-group registration collaborator (spec.md §6). Out of scope
/// for materialization: KECS does not create the Kubernetes Services or
/// Ingress objects a real ECS `loadBalancers` config would back. Specified
/// so the interface exists for a deployment that wires real target-group
/// registration in.
#[async_trait]
pub trait Elbv2: Send + Sync {
    async fn register_target(&self, target_group_arn: &str, pod_ip: &str, port: i32) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct LocalElbv2;

#[async_trait]
impl Elbv2 for LocalElbv2 {
    async fn register_target(&self, _target_group_arn: &str, _pod_ip: &str, _port: i32) -> anyhow::Result<()> {
        Ok(())
    }
}
