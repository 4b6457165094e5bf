use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum TaskDefinitionStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for TaskDefinitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskDefinitionStatus::Active => "Active",
            TaskDefinitionStatus::Inactive => "Inactive",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "text")]
pub enum NetworkMode {
    #[default]
    Bridge,
    Host,
    Awsvpc,
    None,
}

/// A single container definition inside a task definition. Stored as part of
/// the task definition's `container_definitions` JSON column rather than a
/// separate table — containers have no independent identity or lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub cpu: Option<i32>,
    #[serde(default)]
    pub memory: Option<i32>,
    #[serde(default)]
    pub essential: Option<bool>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, rename = "portMappings")]
    pub port_mappings: Vec<PortMapping>,
    #[serde(default)]
    pub environment: Vec<KeyValuePair>,
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
    #[serde(default, rename = "logConfiguration")]
    pub log_configuration: Option<LogConfiguration>,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<ContainerDependency>,
    #[serde(default, rename = "healthCheck")]
    pub health_check: Option<HealthCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(rename = "containerPort")]
    pub container_port: u16,
    #[serde(rename = "hostPort", default)]
    pub host_port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(rename = "valueFrom")]
    pub value_from: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfiguration {
    #[serde(rename = "logDriver")]
    pub log_driver: String,
    #[serde(default)]
    pub options: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDependency {
    #[serde(rename = "containerName")]
    pub container_name: String,
    pub condition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub command: Vec<String>,
    #[serde(default)]
    pub interval: Option<i32>,
    #[serde(default)]
    pub timeout: Option<i32>,
    #[serde(default)]
    pub retries: Option<i32>,
    #[serde(rename = "startPeriod", default)]
    pub start_period: Option<i32>,
}

/// Immutable template of containers and resources, versioned by revision.
///
/// `(family, revision)` is globally unique; revisions are dense and monotonic
/// per family (spec.md §3, §8).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskDefinition {
    pub id: Uuid,
    pub family: String,
    pub revision: i32,
    pub arn: String,
    pub status: TaskDefinitionStatus,
    pub network_mode: NetworkMode,
    pub container_definitions: sqlx::types::Json<Vec<ContainerDefinition>>,
    pub volumes: sqlx::types::Json<serde_json::Value>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub execution_role_arn: Option<String>,
    pub task_role_arn: Option<String>,
    pub requires_compatibilities: sqlx::types::Json<Vec<String>>,
    pub placement_constraints: sqlx::types::Json<serde_json::Value>,
    pub runtime_platform: sqlx::types::Json<Option<serde_json::Value>>,
    pub proxy_configuration: sqlx::types::Json<Option<serde_json::Value>>,
    pub tags: sqlx::types::Json<Tags>,
    pub deregistered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDefinition {
    pub fn family_revision(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }

    /// Derives a stable ServiceAccount name from the task role's ARN resource
    /// segment, so the same role always resolves to the same ServiceAccount
    /// across every task definition revision that references it (spec.md
    /// §4.2 "IAM task role becomes an annotation and a ServiceAccount with
    /// matching name and role annotations").
    pub fn task_role_service_account_name(&self) -> Option<String> {
        let arn = self.task_role_arn.as_ref()?;
        let role_name = arn.rsplit('/').next().unwrap_or(arn);
        let sanitized: String = role_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        Some(format!("ecs-task-role-{sanitized}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_role_service_account_name_is_derived_from_role_arn_suffix() {
        let mut task_definition = TaskDefinition {
            id: Uuid::nil(),
            family: "web".into(),
            revision: 1,
            arn: String::new(),
            status: TaskDefinitionStatus::Active,
            network_mode: NetworkMode::Bridge,
            container_definitions: sqlx::types::Json(vec![]),
            volumes: sqlx::types::Json(serde_json::json!([])),
            cpu: None,
            memory: None,
            execution_role_arn: None,
            task_role_arn: None,
            requires_compatibilities: sqlx::types::Json(vec![]),
            placement_constraints: sqlx::types::Json(serde_json::json!([])),
            runtime_platform: sqlx::types::Json(None),
            proxy_configuration: sqlx::types::Json(None),
            tags: sqlx::types::Json(Default::default()),
            deregistered_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(task_definition.task_role_service_account_name(), None);

        task_definition.task_role_arn = Some("arn:aws:iam::000000000000:role/MyApp_Task_Role".into());
        assert_eq!(
            task_definition.task_role_service_account_name().as_deref(),
            Some("ecs-task-role-myapp-task-role")
        );
    }
}
