use k8s_openapi::api::core::v1::{ConfigMap, Pod, ServiceAccount};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{require_str, tags_from_json, AppState};
use crate::error::ApiError;
use crate::k8s::translate::task_pod::{build_pod, pod_name_for_task};
use crate::k8s::FIELD_MANAGER;
use crate::model::{arn::Arn, HealthStatus, Task};
use crate::store::tasks::{self, RunInput, RunOutcome};
use crate::store::{clusters, services, task_definitions};

const MAX_RUN_TASK_COUNT: i64 = 10;

fn render(task: &Task) -> Value {
    json!({
        "taskArn": task.task_arn,
        "clusterArn": task.cluster_arn,
        "taskDefinitionArn": task.task_definition_arn,
        "group": task.group,
        "lastStatus": task.last_status.to_string(),
        "desiredStatus": task.desired_status.to_string(),
        "healthStatus": render_health_status(task.health_status),
        "containers": task.container_states.0,
        "startedAt": task.started_at,
        "stoppedAt": task.stopped_at,
        "stoppedReason": task.stopped_reason,
        "tags": crate::api::tags_to_json(&task.tags.0),
    })
}

fn render_health_status(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Unknown => "UNKNOWN",
        HealthStatus::Healthy => "HEALTHY",
        HealthStatus::Unhealthy => "UNHEALTHY",
    }
}

/// Materializes the bare Pod for a freshly created task and records its
/// namespace/pod name on the row, so the reconciler's `pod_to_task` mapper
/// can find its way back (spec.md §4.2 `RunTask -> bare Pod`).
async fn materialize_pod(
    state: &AppState,
    task: &Task,
    cluster_name: &str,
    k8s_cluster_name: &str,
    namespace: &str,
    task_definition: &crate::model::TaskDefinition,
) -> Result<Task, ApiError> {
    let pod_name = pod_name_for_task(task);
    let task = tasks::bind_pod(&state.store.pool, task.id, namespace, &pod_name).await?;

    let materialization = build_pod(&task, cluster_name, task_definition);
    let client = state.kube_client_for(k8s_cluster_name).await?;
    let params = PatchParams::apply(FIELD_MANAGER).force();

    if let Some(service_account) = &materialization.service_account {
        let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
        let name = service_account.metadata.name.as_deref().unwrap_or_default();
        sa_api
            .patch(name, &params, &Patch::Apply(service_account))
            .await
            .map_err(|e| ApiError::internal_anyhow(e.into(), "failed to apply ServiceAccount"))?;
    }

    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    for configmap in &materialization.configmaps {
        let name = configmap.metadata.name.as_deref().unwrap_or_default();
        cm_api
            .patch(name, &params, &Patch::Apply(configmap))
            .await
            .map_err(|e| ApiError::internal_anyhow(e.into(), "failed to apply ConfigMap"))?;
    }

    let api: Api<Pod> = Api::namespaced(client, namespace);
    api.patch(&pod_name, &params, &Patch::Apply(&materialization.pod))
        .await
        .map_err(|e| ApiError::internal_anyhow(e.into(), "failed to apply Pod"))?;

    Ok(task)
}

pub async fn run_task(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let task_definition_identifier = require_str(&body, "taskDefinition")?;
    let task_definition = task_definitions::resolve(&state.store.pool, task_definition_identifier)
        .await?
        .ok_or_else(|| ApiError::task_definition_not_found(task_definition_identifier))?;

    let count = body
        .get("count")
        .and_then(Value::as_i64)
        .unwrap_or(1)
        .clamp(1, MAX_RUN_TASK_COUNT);
    let group = body.get("group").and_then(Value::as_str).map(str::to_string);
    let tags = tags_from_json(&body);
    // A clientToken only disambiguates a single task; with count > 1 each
    // task needs its own identity, so the token is honored only for the
    // single-task case (spec.md §4.1 "Idempotency & Dedup" is scoped to one
    // task per call there).
    let client_token = if count == 1 {
        body.get("clientToken").and_then(Value::as_str).map(str::to_string)
    } else {
        None
    };

    let namespace = cluster.namespace(&state.aws.region);
    let mut tasks_out = Vec::new();

    for _ in 0..count {
        let task_id = Uuid::new_v4().to_string();
        let task_arn = Arn::task(&state.aws.region, &state.aws.account_id, &cluster.name, &task_id);

        let input = RunInput {
            cluster_arn: &cluster.arn,
            task_arn: task_arn.as_str(),
            task_definition_arn: &task_definition.arn,
            group: group.clone(),
            client_token: client_token.clone(),
            tags: tags.clone(),
        };

        let task = match tasks::run(&state.store.pool, input).await? {
            RunOutcome::Created(task) => {
                materialize_pod(
                    state,
                    &task,
                    &cluster.name,
                    &cluster.k8s_cluster_name,
                    &namespace,
                    &task_definition,
                )
                .await?
            }
            RunOutcome::Replayed(task) => task,
        };
        tasks_out.push(task);
    }

    clusters::refresh_counters(&state.store.pool, &cluster.arn).await?;

    Ok(json!({
        "tasks": tasks_out.iter().map(render).collect::<Vec<_>>(),
        "failures": [],
    }))
}

/// Sets `DesiredStatus=STOPPED` and deletes the backing Pod; the reconciler
/// observes the deletion and drives `LastStatus` to STOPPED on its own
/// schedule (spec.md §4.1, §9 "Pod deleted -> Task STOPPED").
pub async fn stop_task(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let task_arn = require_str(&body, "task")?;
    let task = tasks::find_by_arn(&state.store.pool, task_arn)
        .await?
        .ok_or_else(|| ApiError::invalid_parameter(format!("task not found: {task_arn}")))?;

    let reason = body.get("reason").and_then(Value::as_str).map(str::to_string);
    let task = tasks::request_stop(&state.store.pool, &task.task_arn, reason)
        .await?
        .ok_or_else(|| ApiError::invalid_parameter(format!("task not found: {task_arn}")))?;

    if let (Some(namespace), Some(pod_name)) = (&task.namespace, &task.pod_name) {
        let client = state.kube_client_for(&cluster.k8s_cluster_name).await?;
        let api: Api<Pod> = Api::namespaced(client, namespace);
        match api.delete(pod_name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(ApiError::internal_anyhow(e.into(), "failed to delete Pod")),
        }
    }

    Ok(json!({ "task": render(&task) }))
}

pub async fn describe_tasks(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let identifiers: Vec<String> = body
        .get("tasks")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut tasks_out = Vec::new();
    let mut failures = Vec::new();

    for identifier in &identifiers {
        match tasks::find_by_arn(&state.store.pool, identifier).await? {
            Some(task) => tasks_out.push(task),
            None => failures.push(json!({ "arn": identifier, "reason": "MISSING" })),
        }
    }

    Ok(json!({
        "tasks": tasks_out.iter().map(render).collect::<Vec<_>>(),
        "failures": failures,
    }))
}

pub async fn list_tasks(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let deployment_name = match body.get("serviceName").and_then(Value::as_str) {
        Some(service_name) => {
            let service = services::find_by_cluster_and_name(&state.store.pool, &cluster.arn, service_name)
                .await?
                .ok_or_else(|| ApiError::service_not_found(service_name))?;
            Some(service.deployment_name)
        }
        None => None,
    };

    let tasks = tasks::list_by_cluster(&state.store.pool, &cluster.arn, deployment_name.as_deref()).await?;
    Ok(json!({
        "taskArns": tasks.iter().map(|t| t.task_arn.clone()).collect::<Vec<_>>(),
    }))
}
