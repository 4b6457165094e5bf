pub mod cluster;
pub mod service;
pub mod task;
pub mod task_definition;

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{AwsSettings, K3dSettings};
use crate::error::ApiError;
use crate::k8s::provisioner::K3dProvisioner;
use crate::reconcile::supervisor::Supervisor;
use crate::store::Store;

/// Shared handler state, analogous to the teacher's `AppState`: the bits
/// every operation handler needs, bundled once instead of threaded through
/// by hand (`src/server/state.rs`).
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub aws: AwsSettings,
    pub k3d: K3dSettings,
    pub reconcilers: Arc<Supervisor>,
}

impl AppState {
    pub fn provisioner(&self) -> K3dProvisioner {
        K3dProvisioner::new(self.k3d.clone())
    }

    /// Builds a `kube::Client` for the k3d cluster backing `k8s_cluster_name`.
    /// Cheap enough to call per-request: `kube::Client` wraps an `hyper`
    /// connection pool, not a fresh TCP handshake (spec.md §4.2).
    pub async fn kube_client_for(&self, k8s_cluster_name: &str) -> Result<kube::Client, ApiError> {
        let path = self.provisioner().kubeconfig_path(k8s_cluster_name);
        crate::k8s::client::client_for_kubeconfig(&path)
            .await
            .map_err(|e| ApiError::internal_anyhow(e, "failed to build kube client"))
    }
}

/// ECS speaks a single wire protocol: every operation is a `POST /` with an
/// `X-Amz-Target` header naming `AmazonEC2ContainerServiceV20141113.<Op>`
/// and a JSON body shaped like that operation's input (spec.md §4.1, §7).
/// This router has exactly one route; dispatch happens on the header.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(dispatch))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(Arc::new(state))
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::invalid_parameter("missing X-Amz-Target header"))?;

    let operation = target
        .rsplit('.')
        .next()
        .ok_or_else(|| ApiError::invalid_parameter("malformed X-Amz-Target header"))?;

    let response = match operation {
        "CreateCluster" => cluster::create_cluster(&state, body).await?,
        "DeleteCluster" => cluster::delete_cluster(&state, body).await?,
        "DescribeClusters" => cluster::describe_clusters(&state, body).await?,
        "ListClusters" => cluster::list_clusters(&state, body).await?,

        "RegisterTaskDefinition" => task_definition::register_task_definition(&state, body).await?,
        "DeregisterTaskDefinition" => task_definition::deregister_task_definition(&state, body).await?,
        "DescribeTaskDefinition" => task_definition::describe_task_definition(&state, body).await?,
        "ListTaskDefinitionFamilies" => task_definition::list_task_definition_families(&state, body).await?,
        "ListTaskDefinitions" => task_definition::list_task_definitions(&state, body).await?,

        "CreateService" => service::create_service(&state, body).await?,
        "UpdateService" => service::update_service(&state, body).await?,
        "DeleteService" => service::delete_service(&state, body).await?,
        "DescribeServices" => service::describe_services(&state, body).await?,
        "ListServices" => service::list_services(&state, body).await?,

        "RunTask" => task::run_task(&state, body).await?,
        "StopTask" => task::stop_task(&state, body).await?,
        "DescribeTasks" => task::describe_tasks(&state, body).await?,
        "ListTasks" => task::list_tasks(&state, body).await?,

        "TagResource" => tag_resource(&state, body).await?,
        "UntagResource" => untag_resource(&state, body).await?,
        "ListTagsForResource" => list_tags_for_resource(&state, body).await?,

        other => {
            return Err(ApiError::invalid_parameter(format!(
                "unsupported operation: {other}"
            )))
        }
    };

    Ok(Json(response))
}

/// Helper shared by every handler: read a required string field out of the
/// request body, erroring with ECS's own wording when it's missing.
pub(crate) fn require_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::invalid_parameter(format!("missing required parameter: {field}")))
}

/// Every create/register operation accepts the same `tags: [{key, value}]`
/// shape (spec.md §3); parsed once here rather than per-handler.
pub(crate) fn tags_from_json(body: &Value) -> crate::model::Tags {
    body.get("tags")
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
        .unwrap_or_default()
}

pub(crate) fn tags_to_json(tags: &crate::model::Tags) -> Vec<Value> {
    tags.iter()
        .map(|(k, v)| json!({ "key": k, "value": v }))
        .collect()
}

async fn tag_resource(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let resource_arn = require_str(&body, "resourceArn")?.to_string();
    let tags = body
        .get("tags")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut map = std::collections::HashMap::new();
    for tag in tags {
        if let (Some(key), Some(value)) = (
            tag.get("key").and_then(Value::as_str),
            tag.get("value").and_then(Value::as_str),
        ) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    crate::store::tags::merge_tags(&state.store.pool, &resource_arn, &map).await?;
    Ok(serde_json::json!({}))
}

async fn untag_resource(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let resource_arn = require_str(&body, "resourceArn")?.to_string();
    let keys: Vec<String> = body
        .get("tagKeys")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    crate::store::tags::remove_tags(&state.store.pool, &resource_arn, &keys).await?;
    Ok(serde_json::json!({}))
}

async fn list_tags_for_resource(state: &AppState, body: Value) -> Result<Value, ApiError> {
    let resource_arn = require_str(&body, "resourceArn")?.to_string();
    let tags = crate::store::tags::list_tags(&state.store.pool, &resource_arn).await?;
    let tags: Vec<Value> = tags
        .into_iter()
        .map(|(k, v)| serde_json::json!({ "key": k, "value": v }))
        .collect();
    Ok(serde_json::json!({ "tags": tags }))
}
