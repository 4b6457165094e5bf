use k8s_openapi::api::core::v1::{ConfigMap, Pod, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::k8s::translate::pod_template::build_pod_spec;
use crate::k8s::translate::service_account::build_task_role_service_account;
use crate::k8s::{
    ANNOTATION_TASK_ARN, ANNOTATION_TASK_ROLE_ARN, LABEL_CLUSTER, LABEL_MANAGED_BY,
    LABEL_TASK_ARN_HASH, LABEL_TASK_DEFINITION_FAMILY, MANAGED_BY_VALUE,
};
use crate::model::{Task, TaskDefinition};

/// Everything `build_pod` derives from a `Task` + `TaskDefinition`: the bare
/// Pod plus the auxiliary objects it depends on (log-shipper ConfigMaps, a
/// ServiceAccount for the task's IAM role).
pub struct PodMaterialization {
    pub pod: Pod,
    pub configmaps: Vec<ConfigMap>,
    pub service_account: Option<ServiceAccount>,
}

/// Translates a `RunTask` request into a bare Pod (spec.md §4.2
/// `RunTask -> bare Pod`). Unlike `Service`, a standalone task has no
/// Deployment/ReplicaSet wrapper — its lifecycle is the pod's lifecycle,
/// which is exactly what `reconcile::mapper::pod_to_task` reads back.
pub fn build_pod(task: &Task, cluster_name: &str, task_definition: &TaskDefinition) -> PodMaterialization {
    let pod_name = pod_name_for_task(task);
    let namespace = task.namespace.as_deref().unwrap_or_default();

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());
    labels.insert(
        LABEL_TASK_DEFINITION_FAMILY.to_string(),
        task_definition.family.clone(),
    );
    labels.insert(LABEL_TASK_ARN_HASH.to_string(), pod_name.clone());

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_TASK_ARN.to_string(), task.task_arn.clone());
    if let Some(role_arn) = &task_definition.task_role_arn {
        annotations.insert(ANNOTATION_TASK_ROLE_ARN.to_string(), role_arn.clone());
    }

    let service_account_name = task_definition.task_role_service_account_name();
    let (pod_spec, configmaps) = build_pod_spec(
        task_definition,
        service_account_name.clone(),
        namespace,
        &pod_name,
    );

    let service_account = match (&service_account_name, &task_definition.task_role_arn) {
        (Some(name), Some(role_arn)) => Some(build_task_role_service_account(
            name,
            namespace,
            cluster_name,
            role_arn,
        )),
        _ => None,
    };

    let pod = Pod {
        metadata: ObjectMeta {
            name: Some(pod_name),
            namespace: task.namespace.clone(),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(pod_spec),
        status: None,
    };

    PodMaterialization { pod, configmaps, service_account }
}

/// Pod names are derived from the task ARN's trailing UUID segment so a
/// `pod_to_task` mapper can recover the owning task without an extra lookup:
/// `ecs-task-<uuid>`.
pub fn pod_name_for_task(task: &Task) -> String {
    let id = task.task_arn.rsplit('/').next().unwrap_or(&task.task_arn);
    format!("ecs-task-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HealthStatus, LastStatus, NetworkMode, TaskDefinitionStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_task() -> Task {
        Task {
            id: Uuid::nil(),
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/default".into(),
            task_arn: "arn:aws:ecs:us-east-1:000000000000:task/default/abc123".into(),
            task_definition_arn: String::new(),
            group: None,
            last_status: LastStatus::Provisioning,
            desired_status: LastStatus::Running,
            health_status: HealthStatus::Unknown,
            pod_name: None,
            namespace: Some("default-us-east-1".into()),
            client_token: None,
            started_at: None,
            stopped_at: None,
            stopped_reason: None,
            container_states: sqlx::types::Json(vec![]),
            tags: sqlx::types::Json(Default::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_task_definition() -> TaskDefinition {
        TaskDefinition {
            id: Uuid::nil(),
            family: "worker".into(),
            revision: 2,
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pod_name_derives_from_task_arn_suffix() {
        let task = sample_task();
        assert_eq!(pod_name_for_task(&task), "ecs-task-abc123");
    }

    #[test]
    fn pod_carries_family_label() {
        let materialization = build_pod(&sample_task(), "default", &sample_task_definition());
        let labels = materialization.pod.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_TASK_DEFINITION_FAMILY).unwrap(), "worker");
    }

    #[test]
    fn task_role_arn_produces_service_account_and_annotation() {
        let mut task_definition = sample_task_definition();
        task_definition.task_role_arn = Some("arn:aws:iam::000000000000:role/worker-role".into());
        let materialization = build_pod(&sample_task(), "default", &task_definition);

        let service_account = materialization.service_account.expect("service account expected");
        assert_eq!(service_account.metadata.name.as_deref(), Some("ecs-task-role-worker-role"));

        let annotations = materialization.pod.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(ANNOTATION_TASK_ROLE_ARN).unwrap(),
            "arn:aws:iam::000000000000:role/worker-role"
        );
        assert_eq!(
            materialization.pod.spec.unwrap().service_account_name.as_deref(),
            Some("ecs-task-role-worker-role")
        );
    }
}
