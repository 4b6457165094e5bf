use serde_json::{json, Value};

use crate::api::{require_str, AppState};
use crate::error::ApiError;
use crate::model::{ContainerDefinition, NetworkMode, TaskDefinition, TaskDefinitionStatus};
use crate::store::task_definitions::{self, RegisterInput};

fn render(task_definition: &TaskDefinition) -> Value {
    json!({
        "taskDefinitionArn": task_definition.arn,
        "family": task_definition.family,
        "revision": task_definition.revision,
        "status": task_definition.status.to_string().to_uppercase(),
        "networkMode": network_mode_str(task_definition.network_mode),
        "containerDefinitions": task_definition.container_definitions.0,
        "cpu": task_definition.cpu,
        "memory": task_definition.memory,
        "executionRoleArn": task_definition.execution_role_arn,
        "taskRoleArn": task_definition.task_role_arn,
        "requiresCompatibilities": task_definition.requires_compatibilities.0,
    })
}

fn network_mode_str(mode: NetworkMode) -> &'static str {
    match mode {
        NetworkMode::Bridge => "bridge",
        NetworkMode::Host => "host",
        NetworkMode::Awsvpc => "awsvpc",
        NetworkMode::None => "none",
    }
}

fn parse_network_mode(value: Option<&str>) -> NetworkMode {
    match value {
        Some("host") => NetworkMode::Host,
        Some("awsvpc") => NetworkMode::Awsvpc,
        Some("none") => NetworkMode::None,
        _ => NetworkMode::Bridge,
    }
}

pub async fn register_task_definition(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let family = require_str(&body, "family")?.to_string();

    let container_definitions: Vec<ContainerDefinition> = body
        .get("containerDefinitions")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e: serde_json::Error| ApiError::invalid_parameter(e.to_string()))?
        .unwrap_or_default();

    if container_definitions.is_empty() {
        return Err(ApiError::invalid_parameter(
            "containerDefinitions must contain at least one container",
        ));
    }

    let network_mode = parse_network_mode(body.get("networkMode").and_then(Value::as_str));
    let tags = body
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| {
                    let key = t.get("key")?.as_str()?.to_string();
                    let value = t.get("value")?.as_str()?.to_string();
                    Some((key, value))
                })
                .collect()
        })
        .unwrap_or_default();

    let input = RegisterInput {
        family: &family,
        region: &state.aws.region,
        account_id: &state.aws.account_id,
        network_mode,
        container_definitions,
        volumes: body.get("volumes").cloned().unwrap_or_else(|| json!([])),
        cpu: body.get("cpu").and_then(Value::as_str).map(str::to_string),
        memory: body.get("memory").and_then(Value::as_str).map(str::to_string),
        execution_role_arn: body.get("executionRoleArn").and_then(Value::as_str).map(str::to_string),
        task_role_arn: body.get("taskRoleArn").and_then(Value::as_str).map(str::to_string),
        requires_compatibilities: body
            .get("requiresCompatibilities")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        placement_constraints: body.get("placementConstraints").cloned().unwrap_or_else(|| json!([])),
        runtime_platform: body.get("runtimePlatform").cloned(),
        proxy_configuration: body.get("proxyConfiguration").cloned(),
        tags,
    };

    let task_definition = task_definitions::register(&state.store.pool, input).await?;
    Ok(json!({ "taskDefinition": render(&task_definition) }))
}

pub async fn deregister_task_definition(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let identifier = require_str(&body, "taskDefinition")?;
    let task_definition = task_definitions::resolve(&state.store.pool, identifier)
        .await?
        .ok_or_else(|| ApiError::task_definition_not_found(identifier))?;

    let task_definition = task_definitions::deregister(&state.store.pool, &task_definition.arn)
        .await?
        .ok_or_else(|| ApiError::task_definition_not_found(identifier))?;

    Ok(json!({ "taskDefinition": render(&task_definition) }))
}

pub async fn describe_task_definition(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let identifier = require_str(&body, "taskDefinition")?;
    let task_definition = task_definitions::resolve(&state.store.pool, identifier)
        .await?
        .ok_or_else(|| ApiError::task_definition_not_found(identifier))?;

    Ok(json!({ "taskDefinition": render(&task_definition) }))
}

pub async fn list_task_definition_families(state: &AppState, _body: Value) -> Result<Value, ApiError> {
    let families = task_definitions::list_families(&state.store.pool).await?;
    Ok(json!({ "families": families }))
}

pub async fn list_task_definitions(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let family = body.get("familyPrefix").and_then(Value::as_str);
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(|s| if s.eq_ignore_ascii_case("inactive") {
            TaskDefinitionStatus::Inactive
        } else {
            TaskDefinitionStatus::Active
        });

    let arns = task_definitions::list_arns_for_family(&state.store.pool, family, status).await?;
    Ok(json!({ "taskDefinitionArns": arns }))
}
