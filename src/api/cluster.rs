use serde_json::{json, Value};

use crate::api::{require_str, tags_from_json, tags_to_json, AppState};
use crate::error::ApiError;
use crate::model::{arn::Arn, Cluster};
use crate::store::clusters;

fn render(cluster: &Cluster) -> Value {
    json!({
        "clusterArn": cluster.arn,
        "clusterName": cluster.name,
        "status": cluster.status.to_string(),
        "runningTasksCount": cluster.running_tasks_count,
        "pendingTasksCount": cluster.pending_tasks_count,
        "activeServicesCount": cluster.active_services_count,
        "registeredContainerInstancesCount": cluster.registered_container_instances_count,
        "tags": tags_to_json(&cluster.tags.0),
    })
}

/// Returns as soon as the cluster row is persisted; the k3d cluster and its
/// namespace are provisioned on a detached task so the caller never waits on
/// `k3d cluster create` (spec.md §4.1 "creation is asynchronous").
pub async fn create_cluster(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let name = body
        .get("clusterName")
        .and_then(Value::as_str)
        .unwrap_or("default")
        .to_string();
    let arn = Arn::cluster(&state.aws.region, &state.aws.account_id, &name);
    let k8s_cluster_name = Cluster::derive_k8s_cluster_name(&name);
    let tags = tags_from_json(&body);

    let cluster = clusters::create(&state.store.pool, &name, arn.as_str(), &k8s_cluster_name, &tags).await?;

    let state = state.clone();
    let cluster_id = cluster.id;
    let region = state.aws.region.clone();
    let namespace = cluster.namespace(&region);
    let cluster_name = cluster.name.clone();
    tokio::spawn(async move {
        if let Err(err) = provision_cluster(&state, &k8s_cluster_name, &namespace, &cluster_name).await {
            tracing::error!(cluster = %cluster_name, %err, "failed to provision cluster substrate");
            return;
        }
        if let Err(err) = clusters::set_status(&state.store.pool, cluster_id, crate::model::ClusterStatus::Active).await {
            tracing::error!(cluster = %cluster_name, %err, "failed to mark cluster active");
        }
    });

    Ok(json!({ "cluster": render(&cluster) }))
}

async fn provision_cluster(
    state: &AppState,
    k8s_cluster_name: &str,
    namespace: &str,
    cluster_name: &str,
) -> anyhow::Result<()> {
    state.provisioner().create(k8s_cluster_name).await?;
    let kubeconfig_path = state.provisioner().kubeconfig_path(k8s_cluster_name);
    let client = crate::k8s::client::client_for_kubeconfig(&kubeconfig_path).await?;
    crate::k8s::namespace::ensure(&client, namespace, cluster_name).await?;
    state.reconcilers.ensure_started(k8s_cluster_name, client).await;
    Ok(())
}

/// Rejects unless the cluster has no active services and no running tasks
/// (spec.md §4.1, §9 invariant). On success the row is removed and the k3d
/// cluster teardown is scheduled on a detached task — callers don't block on
/// `k3d cluster delete`.
pub async fn delete_cluster(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let identifier = require_str(&body, "cluster")?;
    let cluster = clusters::find_by_name_or_arn(&state.store.pool, identifier)
        .await?
        .ok_or_else(|| ApiError::cluster_not_found(identifier))?;

    if cluster.active_services_count > 0 || cluster.running_tasks_count > 0 {
        return Err(ApiError::client(
            "cluster has active services or running tasks and cannot be deleted",
        ));
    }

    let cluster = clusters::set_status(&state.store.pool, cluster.id, crate::model::ClusterStatus::Inactive).await?;
    clusters::delete(&state.store.pool, cluster.id).await?;

    let provisioner = state.provisioner();
    let k8s_cluster_name = cluster.k8s_cluster_name.clone();
    tokio::spawn(async move {
        if let Err(err) = provisioner.delete(&k8s_cluster_name).await {
            tracing::warn!(cluster = %k8s_cluster_name, %err, "failed to tear down k3d cluster");
        }
    });

    Ok(json!({ "cluster": render(&cluster) }))
}

pub async fn describe_clusters(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let identifiers: Vec<String> = body
        .get("clusters")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut clusters_out = Vec::new();
    let mut failures = Vec::new();

    if identifiers.is_empty() {
        clusters_out = clusters::list(&state.store.pool).await?;
    } else {
        for identifier in &identifiers {
            match clusters::find_by_name_or_arn(&state.store.pool, identifier).await? {
                Some(cluster) => clusters_out.push(cluster),
                None => failures.push(json!({ "arn": identifier, "reason": "MISSING" })),
            }
        }
    }

    Ok(json!({
        "clusters": clusters_out.iter().map(render).collect::<Vec<_>>(),
        "failures": failures,
    }))
}

pub async fn list_clusters(state: &AppState, _body: Value) -> Result<Value, ApiError> {
    let clusters = clusters::list(&state.store.pool).await?;
    Ok(json!({
        "clusterArns": clusters.iter().map(|c| c.arn.clone()).collect::<Vec<_>>(),
    }))
}
