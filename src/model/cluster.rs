use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Tags;

/// Cluster status, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum ClusterStatus {
    Active,
    Provisioning,
    Deprovisioning,
    Inactive,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterStatus::Active => "ACTIVE",
            ClusterStatus::Provisioning => "PROVISIONING",
            ClusterStatus::Deprovisioning => "DEPROVISIONING",
            ClusterStatus::Inactive => "INACTIVE",
        };
        write!(f, "{s}")
    }
}

/// A named grouping of services and tasks, backed by one Kubernetes cluster.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
    pub arn: String,
    pub status: ClusterStatus,
    /// Deterministic Kubernetes-cluster identifier derived from `name`.
    pub k8s_cluster_name: String,
    pub running_tasks_count: i32,
    pub pending_tasks_count: i32,
    pub active_services_count: i32,
    pub registered_container_instances_count: i32,
    pub tags: sqlx::types::Json<Tags>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// Deterministic k3d cluster name: `kecs-{ecs-cluster-name}`, lowercased and
    /// truncated to satisfy Kubernetes/k3d's DNS-label length limit.
    pub fn derive_k8s_cluster_name(ecs_cluster_name: &str) -> String {
        let sanitized: String = ecs_cluster_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let mut name = format!("kecs-{sanitized}");
        name.truncate(63);
        name.trim_end_matches('-').to_string()
    }

    /// The namespace this cluster's workloads live in for the given region,
    /// per spec.md §4.2: `{cluster}-{region}`.
    pub fn namespace(&self, region: &str) -> String {
        format!("{}-{}", self.name, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k8s_cluster_name_is_deterministic_and_sanitized() {
        assert_eq!(Cluster::derive_k8s_cluster_name("default"), "kecs-default");
        assert_eq!(Cluster::derive_k8s_cluster_name("My_Cluster"), "kecs-my-cluster");
    }

    #[test]
    fn namespace_combines_name_and_region() {
        let cluster = Cluster {
            id: Uuid::nil(),
            name: "default".into(),
            arn: String::new(),
            status: ClusterStatus::Active,
            k8s_cluster_name: "kecs-default".into(),
            running_tasks_count: 0,
            pending_tasks_count: 0,
            active_services_count: 0,
            registered_container_instances_count: 0,
            tags: sqlx::types::Json(Tags::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(cluster.namespace("us-east-1"), "default-us-east-1");
    }
}
