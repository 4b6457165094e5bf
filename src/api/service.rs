use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use kube::api::{Api, Patch, PatchParams};
use serde_json::{json, Value};

use crate::api::{require_str, tags_from_json, AppState};
use crate::error::ApiError;
use crate::k8s::translate::deployment::build_deployment;
use crate::k8s::FIELD_MANAGER;
use crate::model::{arn::Arn, DeploymentConfiguration, LaunchType, Service, ServiceStatus};
use crate::store::services::{self, CreateInput};
use crate::store::{clusters, task_definitions};

fn render(service: &Service) -> Value {
    json!({
        "serviceArn": service.arn,
        "serviceName": service.service_name,
        "clusterArn": service.cluster_arn,
        "taskDefinition": service.task_definition_arn,
        "desiredCount": service.desired_count,
        "runningCount": service.running_count,
        "pendingCount": service.pending_count,
        "status": render_status(service.status),
        "launchType": render_launch_type(service.launch_type),
        "deploymentConfiguration": render_deployment_configuration(&service.deployment_configuration.0),
        "placementStrategy": service.placement_strategy.0,
        "placementConstraints": service.placement_constraints.0,
        "loadBalancers": service.load_balancers.0,
        "serviceRegistries": service.service_registries.0,
        "networkConfiguration": service.network_configuration.0,
    })
}

fn render_status(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Active => "ACTIVE",
        ServiceStatus::Draining => "DRAINING",
        ServiceStatus::Inactive => "INACTIVE",
    }
}

fn render_launch_type(launch_type: LaunchType) -> &'static str {
    match launch_type {
        LaunchType::Fargate => "FARGATE",
        LaunchType::Ec2 => "EC2",
        LaunchType::External => "EXTERNAL",
    }
}

fn render_deployment_configuration(config: &DeploymentConfiguration) -> Value {
    json!({
        "minimumHealthyPercent": config.minimum_healthy_percent,
        "maximumPercent": config.maximum_percent,
        "deploymentCircuitBreaker": config.deployment_circuit_breaker,
    })
}

fn parse_launch_type(value: Option<&str>) -> LaunchType {
    match value {
        Some("EC2") => LaunchType::Ec2,
        Some("EXTERNAL") => LaunchType::External,
        _ => LaunchType::Fargate,
    }
}

/// Applies the service's current desired state as a Kubernetes Deployment,
/// via server-side apply so a repeated call (retry, reconciliation resync,
/// `UpdateService`) converges rather than conflicting with itself.
async fn apply_deployment(state: &AppState, service: &Service) -> Result<(), ApiError> {
    let cluster = clusters::find_by_arn(&state.store.pool, &service.cluster_arn)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(&service.cluster_arn))?;
    let task_definition = task_definitions::find_by_arn(&state.store.pool, &service.task_definition_arn)
        .await?
        .ok_or_else(|| ApiError::task_definition_not_found(&service.task_definition_arn))?;

    let materialization = build_deployment(service, &cluster.name, &task_definition);
    let client = state.kube_client_for(&cluster.k8s_cluster_name).await?;
    let params = PatchParams::apply(FIELD_MANAGER).force();

    if let Some(service_account) = &materialization.service_account {
        let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &service.namespace);
        let name = service_account.metadata.name.as_deref().unwrap_or_default();
        sa_api
            .patch(name, &params, &Patch::Apply(service_account))
            .await
            .map_err(|e| ApiError::internal_anyhow(e.into(), "failed to apply ServiceAccount"))?;
    }

    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), &service.namespace);
    for configmap in &materialization.configmaps {
        let name = configmap.metadata.name.as_deref().unwrap_or_default();
        cm_api
            .patch(name, &params, &Patch::Apply(configmap))
            .await
            .map_err(|e| ApiError::internal_anyhow(e.into(), "failed to apply ConfigMap"))?;
    }

    let api: Api<Deployment> = Api::namespaced(client, &service.namespace);
    api.patch(
        &service.deployment_name,
        &params,
        &Patch::Apply(&materialization.deployment),
    )
    .await
    .map_err(|e| ApiError::internal_anyhow(e.into(), "failed to apply Deployment"))?;
    Ok(())
}

pub async fn create_service(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let service_name = require_str(&body, "serviceName")?.to_string();
    let task_definition_identifier = require_str(&body, "taskDefinition")?;
    let task_definition = task_definitions::resolve(&state.store.pool, task_definition_identifier)
        .await?
        .ok_or_else(|| ApiError::task_definition_not_found(task_definition_identifier))?;

    let desired_count = body.get("desiredCount").and_then(Value::as_i64).unwrap_or(1) as i32;
    if desired_count < 0 {
        return Err(ApiError::invalid_parameter("desiredCount must be >= 0"));
    }

    if services::find_by_cluster_and_name(&state.store.pool, &cluster.arn, &service_name)
        .await?
        .is_some()
    {
        return Err(ApiError::client(format!(
            "service {service_name} already exists in cluster {cluster_identifier}"
        )));
    }

    let arn = Arn::service(&state.aws.region, &state.aws.account_id, &cluster.name, &service_name);
    let deployment_name = Service::derive_deployment_name(&service_name);
    let namespace = cluster.namespace(&state.aws.region);

    let deployment_configuration: DeploymentConfiguration = body
        .get("deploymentConfiguration")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e: serde_json::Error| ApiError::invalid_parameter(e.to_string()))?
        .unwrap_or_default();

    let tags = tags_from_json(&body);

    let input = CreateInput {
        cluster_arn: &cluster.arn,
        service_name: &service_name,
        arn: arn.as_str(),
        task_definition_arn: &task_definition.arn,
        desired_count,
        launch_type: parse_launch_type(body.get("launchType").and_then(Value::as_str)),
        deployment_configuration,
        placement_strategy: body.get("placementStrategy").cloned().unwrap_or_else(|| json!([])),
        placement_constraints: body.get("placementConstraints").cloned().unwrap_or_else(|| json!([])),
        load_balancers: body.get("loadBalancers").cloned().unwrap_or_else(|| json!([])),
        service_registries: body.get("serviceRegistries").cloned().unwrap_or_else(|| json!([])),
        network_configuration: body.get("networkConfiguration").cloned(),
        deployment_name: &deployment_name,
        namespace: &namespace,
        tags,
    };

    let service = services::create(&state.store.pool, input).await?;
    apply_deployment(state, &service).await?;
    clusters::refresh_counters(&state.store.pool, &cluster.arn).await?;

    Ok(json!({ "service": render(&service) }))
}

pub async fn update_service(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let identifier = require_str(&body, "service")?;
    let mut service = services::resolve(&state.store.pool, &cluster.arn, identifier)
        .await?
        .ok_or_else(|| ApiError::service_not_found(identifier))?;

    if let Some(desired_count) = body.get("desiredCount").and_then(Value::as_i64) {
        if desired_count < 0 {
            return Err(ApiError::invalid_parameter("desiredCount must be >= 0"));
        }
        service = services::update_desired_count(&state.store.pool, service.id, desired_count as i32).await?;
    }

    if let Some(task_definition_identifier) = body.get("taskDefinition").and_then(Value::as_str) {
        let task_definition = task_definitions::resolve(&state.store.pool, task_definition_identifier)
            .await?
            .ok_or_else(|| ApiError::task_definition_not_found(task_definition_identifier))?;
        service = services::update_task_definition(&state.store.pool, service.id, &task_definition.arn).await?;
    }

    apply_deployment(state, &service).await?;
    Ok(json!({ "service": render(&service) }))
}

/// `DeleteService` scales to zero, removes the Deployment, then the row
/// (spec.md §4.1). Without a `force` flag we still proceed synchronously —
/// KECS has no blocking "wait for runningCount=0" step; the Deployment
/// deletion itself tears down the pods.
pub async fn delete_service(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let identifier = require_str(&body, "service")?;
    let service = services::resolve(&state.store.pool, &cluster.arn, identifier)
        .await?
        .ok_or_else(|| ApiError::service_not_found(identifier))?;

    let service = services::update_desired_count(&state.store.pool, service.id, 0).await?;
    let service = services::set_status(&state.store.pool, service.id, ServiceStatus::Draining).await?;

    let client = state.kube_client_for(&cluster.k8s_cluster_name).await?;
    let api: Api<Deployment> = Api::namespaced(client, &service.namespace);
    match api.delete(&service.deployment_name, &Default::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(ApiError::internal_anyhow(e.into(), "failed to delete Deployment")),
    }

    services::delete(&state.store.pool, service.id).await?;
    clusters::refresh_counters(&state.store.pool, &cluster.arn).await?;

    Ok(json!({ "service": render(&service) }))
}

pub async fn describe_services(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let identifiers: Vec<String> = body
        .get("services")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut services_out = Vec::new();
    let mut failures = Vec::new();

    if identifiers.is_empty() {
        services_out = services::list_by_cluster(&state.store.pool, &cluster.arn).await?;
    } else {
        for identifier in &identifiers {
            match services::resolve(&state.store.pool, &cluster.arn, identifier).await? {
                Some(service) => services_out.push(service),
                None => failures.push(json!({ "arn": identifier, "reason": "MISSING" })),
            }
        }
    }

    Ok(json!({
        "services": services_out.iter().map(render).collect::<Vec<_>>(),
        "failures": failures,
    }))
}

pub async fn list_services(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let cluster_identifier = body.get("cluster").and_then(Value::as_str).unwrap_or("default");
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, cluster_identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(cluster_identifier))?;

    let services = services::list_by_cluster(&state.store.pool, &cluster.arn).await?;
    Ok(json!({
        "serviceArns": services.iter().map(|s| s.arn.clone()).collect::<Vec<_>>(),
    }))
}
