use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum ServiceStatus {
    Active,
    Draining,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "text")]
pub enum LaunchType {
    #[default]
    Fargate,
    Ec2,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfiguration {
    #[serde(rename = "minimumHealthyPercent", default = "default_min_healthy_percent")]
    pub minimum_healthy_percent: i32,
    #[serde(rename = "maximumPercent", default = "default_max_percent")]
    pub maximum_percent: i32,
    #[serde(rename = "deploymentCircuitBreaker", default)]
    pub deployment_circuit_breaker: Option<DeploymentCircuitBreaker>,
}

fn default_min_healthy_percent() -> i32 {
    100
}

fn default_max_percent() -> i32 {
    200
}

impl Default for DeploymentConfiguration {
    fn default() -> Self {
        Self {
            minimum_healthy_percent: default_min_healthy_percent(),
            maximum_percent: default_max_percent(),
            deployment_circuit_breaker: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentCircuitBreaker {
    pub enable: bool,
    pub rollback: bool,
}

/// A long-running, scaled instantiation of a task definition, backed by a
/// Kubernetes Deployment. Identity is `(cluster_arn, service_name)` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: Uuid,
    pub cluster_arn: String,
    pub service_name: String,
    pub arn: String,
    pub task_definition_arn: String,
    pub desired_count: i32,
    pub running_count: i32,
    pub pending_count: i32,
    pub status: ServiceStatus,
    pub launch_type: LaunchType,
    pub deployment_configuration: sqlx::types::Json<DeploymentConfiguration>,
    pub placement_strategy: sqlx::types::Json<serde_json::Value>,
    pub placement_constraints: sqlx::types::Json<serde_json::Value>,
    pub load_balancers: sqlx::types::Json<serde_json::Value>,
    pub service_registries: sqlx::types::Json<serde_json::Value>,
    pub network_configuration: sqlx::types::Json<Option<serde_json::Value>>,
    /// Name of the Kubernetes Deployment backing this service.
    pub deployment_name: String,
    pub namespace: String,
    pub tags: sqlx::types::Json<Tags>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Kubernetes Deployment name derived from the service name. Deterministic
    /// and idempotent so repeated `CreateService` calls target the same object.
    pub fn derive_deployment_name(service_name: &str) -> String {
        let sanitized: String = service_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        format!("ecs-{sanitized}")
    }
}
