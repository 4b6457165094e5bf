pub mod elbv2;
pub mod iam;
pub mod logs;
pub mod service_discovery;
pub mod ssm;
pub mod task_updater;

pub use elbv2::{Elbv2, LocalElbv2};
pub use iam::{Iam, LocalIam};
pub use logs::{LocalLogs, Logs};
pub use service_discovery::{LocalServiceDiscovery, ServiceDiscovery};
pub use ssm::{LocalSsm, Ssm};
pub use task_updater::{ServiceDiscoveryTaskUpdater, TaskUpdater};

use std::sync::Arc;

/// Bundles every external collaborator the core only consumes through a
/// trait boundary (spec.md §6: IAM, CloudWatch Logs, SSM/Secrets Manager,
/// Service Discovery, ELBv2). KECS never calls real AWS — each `Local*`
/// implementation is a structural stand-in, grounded the same way the rest
/// of this crate structurally maps ECS concepts onto Kubernetes ones instead
/// of calling out to a real control plane.
#[derive(Clone)]
pub struct Integrations {
    pub iam: Arc<dyn Iam>,
    pub logs: Arc<dyn Logs>,
    pub ssm: Arc<dyn Ssm>,
    pub service_discovery: Arc<dyn ServiceDiscovery>,
    pub elbv2: Arc<dyn Elbv2>,
    pub task_updater: Arc<dyn TaskUpdater>,
}

impl Default for Integrations {
    fn default() -> Self {
        let service_discovery: Arc<dyn ServiceDiscovery> = Arc::new(LocalServiceDiscovery::default());
        Self {
            iam: Arc::new(LocalIam::default()),
            logs: Arc::new(LocalLogs::default()),
            ssm: Arc::new(LocalSsm::default()),
            task_updater: Arc::new(ServiceDiscoveryTaskUpdater::new(service_discovery.clone())),
            service_discovery,
            elbv2: Arc::new(LocalElbv2::default()),
        }
    }
}
