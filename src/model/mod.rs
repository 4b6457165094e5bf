pub mod arn;
pub mod cluster;
pub mod service;
pub mod task;
pub mod task_definition;

pub use arn::Arn;
pub use cluster::{Cluster, ClusterStatus};
pub use service::{DeploymentConfiguration, LaunchType, Service, ServiceStatus};
pub use task::{ContainerState, HealthStatus, LastStatus, Task};
pub use task_definition::{
    ContainerDefinition, NetworkMode, TaskDefinition, TaskDefinitionStatus,
};

use std::collections::HashMap;

/// Free-form key/value tags carried by every entity, per spec.md §3.
pub type Tags = HashMap<String, String>;
