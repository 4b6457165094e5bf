use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Tags;

/// `LastStatus`/`DesiredStatus`, per spec.md §3. Ordered so that `>=` comparisons
/// detect monotonic regressions (STOPPED is a special-case jump from any state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum LastStatus {
    Provisioning,
    Pending,
    Running,
    Deprovisioning,
    Stopped,
}

impl std::fmt::Display for LastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LastStatus::Provisioning => "PROVISIONING",
            LastStatus::Pending => "PENDING",
            LastStatus::Running => "RUNNING",
            LastStatus::Deprovisioning => "DEPROVISIONING",
            LastStatus::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "text")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerState {
    pub name: String,
    #[serde(rename = "lastStatus")]
    pub last_status: String,
    #[serde(rename = "exitCode", default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(rename = "healthStatus", default)]
    pub health_status: Option<String>,
}

/// A running instantiation of a task definition, backed by a Pod. Identity is
/// `(cluster_arn, task_arn)` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub cluster_arn: String,
    pub task_arn: String,
    pub task_definition_arn: String,
    pub group: Option<String>,
    pub last_status: LastStatus,
    pub desired_status: LastStatus,
    pub health_status: HealthStatus,
    pub pod_name: Option<String>,
    pub namespace: Option<String>,
    pub client_token: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stopped_reason: Option<String>,
    pub container_states: sqlx::types::Json<Vec<ContainerState>>,
    pub tags: sqlx::types::Json<Tags>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A STOPPED task must carry a `stopped_at` timestamp (spec.md §3, §8).
    pub fn is_consistent(&self) -> bool {
        self.last_status != LastStatus::Stopped || self.stopped_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_without_timestamp_is_inconsistent() {
        let task = Task {
            id: Uuid::nil(),
            cluster_arn: String::new(),
            task_arn: String::new(),
            task_definition_arn: String::new(),
            group: None,
            last_status: LastStatus::Stopped,
            desired_status: LastStatus::Stopped,
            health_status: HealthStatus::Unknown,
            pod_name: None,
            namespace: None,
            client_token: None,
            started_at: None,
            stopped_at: None,
            stopped_reason: None,
            container_states: sqlx::types::Json(Vec::new()),
            tags: sqlx::types::Json(Tags::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!task.is_consistent());
    }
}
