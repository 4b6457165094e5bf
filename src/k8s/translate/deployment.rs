use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{ConfigMap, PodTemplateSpec, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use crate::k8s::translate::pod_template::build_pod_spec;
use crate::k8s::translate::service_account::build_task_role_service_account;
use crate::k8s::{
    ANNOTATION_SECURITY_GROUPS, ANNOTATION_SUBNETS, ANNOTATION_TASK_ROLE_ARN, LABEL_CLUSTER,
    LABEL_MANAGED_BY, LABEL_SERVICE, MANAGED_BY_VALUE,
};
use crate::model::{NetworkMode, Service, TaskDefinition};

/// Everything `build_deployment` derives from a `Service` + `TaskDefinition`:
/// the Deployment itself plus the auxiliary objects it depends on
/// (log-shipper ConfigMaps, a ServiceAccount for the task's IAM role), so a
/// caller applies all of it with server-side apply in one place.
pub struct DeploymentMaterialization {
    pub deployment: Deployment,
    pub configmaps: Vec<ConfigMap>,
    pub service_account: Option<ServiceAccount>,
}

/// Builds the Deployment labels that both the Deployment's own selector and
/// the Pod template must agree on; changing either independently would
/// orphan running pods, so this is the single source of truth both
/// `build_deployment` and the reconciler's `deployment_to_service` mapper use
/// to find "this service's" objects.
pub fn selector_labels(cluster_name: &str, service_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());
    labels.insert(LABEL_SERVICE.to_string(), service_name.to_string());
    labels
}

/// `awsvpc` network mode has no Deployment-level field, only annotations
/// carrying the subnets/security groups a real provisioner would attach to
/// the pod's ENI (spec.md §4.2 "add annotations with subnets/security-groups").
/// Only `Service` carries `networkConfiguration` in this model — `Task` does
/// not — so this wiring applies only on the Deployment path.
fn awsvpc_annotations(
    task_definition: &TaskDefinition,
    network_configuration: &Option<serde_json::Value>,
) -> Option<BTreeMap<String, String>> {
    if task_definition.network_mode != NetworkMode::Awsvpc {
        return None;
    }
    let config = network_configuration.as_ref()?.get("awsvpcConfiguration")?;

    let mut annotations = BTreeMap::new();
    if let Some(subnets) = config.get("subnets").and_then(|v| v.as_array()) {
        let subnets: Vec<String> = subnets.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        if !subnets.is_empty() {
            annotations.insert(ANNOTATION_SUBNETS.to_string(), subnets.join(","));
        }
    }
    if let Some(groups) = config.get("securityGroups").and_then(|v| v.as_array()) {
        let groups: Vec<String> = groups.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        if !groups.is_empty() {
            annotations.insert(ANNOTATION_SECURITY_GROUPS.to_string(), groups.join(","));
        }
    }
    if annotations.is_empty() {
        None
    } else {
        Some(annotations)
    }
}

/// Translates an ECS `Service` + its current `TaskDefinition` into a
/// Kubernetes Deployment (spec.md §4.2 `Service -> Deployment`). Pure
/// function: the reconciler re-derives this on every `UpdateService` or
/// informer resync and applies it with server-side apply, rather than
/// hand-patching individual fields.
pub fn build_deployment(
    service: &Service,
    cluster_name: &str,
    task_definition: &TaskDefinition,
) -> DeploymentMaterialization {
    let labels = selector_labels(cluster_name, &service.service_name);
    let service_account_name = task_definition.task_role_service_account_name();

    let (mut pod_spec, configmaps) = build_pod_spec(
        task_definition,
        service_account_name.clone(),
        &service.namespace,
        &service.deployment_name,
    );
    pod_spec.termination_grace_period_seconds = Some(30);
    // A Deployment-managed Pod template must be `restartPolicy: Always` — the
    // Kubernetes API rejects anything else — so the essentiality-derived
    // value `build_pod_spec` picked only applies to standalone RunTask pods.
    pod_spec.restart_policy = Some("Always".to_string());

    let mut annotations = BTreeMap::new();
    if let Some(role_arn) = &task_definition.task_role_arn {
        annotations.insert(ANNOTATION_TASK_ROLE_ARN.to_string(), role_arn.clone());
    }
    if let Some(awsvpc) = awsvpc_annotations(task_definition, &service.network_configuration.0) {
        annotations.extend(awsvpc);
    }

    let deployment_config = &service.deployment_configuration.0;
    let max_unavailable = 100 - deployment_config.minimum_healthy_percent.clamp(0, 100);
    let max_surge = (deployment_config.maximum_percent - 100).clamp(0, 100);

    let service_account = match (&service_account_name, &task_definition.task_role_arn) {
        (Some(name), Some(role_arn)) => Some(build_task_role_service_account(
            name,
            &service.namespace,
            cluster_name,
            role_arn,
        )),
        _ => None,
    };

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(service.deployment_name.clone()),
            namespace: Some(service.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(service.desired_count),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::String(format!("{max_unavailable}%"))),
                    max_surge: Some(IntOrString::String(format!("{max_surge}%"))),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: if annotations.is_empty() { None } else { Some(annotations) },
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    };

    DeploymentMaterialization { deployment, configmaps, service_account }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerDefinition, DeploymentConfiguration, LaunchType, ServiceStatus, TaskDefinitionStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_service() -> Service {
        Service {
            id: Uuid::nil(),
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/default".into(),
            service_name: "web".into(),
            arn: String::new(),
            task_definition_arn: String::new(),
            desired_count: 3,
            running_count: 0,
            pending_count: 0,
            status: ServiceStatus::Active,
            launch_type: LaunchType::Fargate,
            deployment_configuration: sqlx::types::Json(DeploymentConfiguration::default()),
            placement_strategy: sqlx::types::Json(serde_json::json!([])),
            placement_constraints: sqlx::types::Json(serde_json::json!([])),
            load_balancers: sqlx::types::Json(serde_json::json!([])),
            service_registries: sqlx::types::Json(serde_json::json!([])),
            network_configuration: sqlx::types::Json(None),
            deployment_name: "ecs-web".into(),
            namespace: "default-us-east-1".into(),
            tags: sqlx::types::Json(Default::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_task_definition() -> TaskDefinition {
        TaskDefinition {
            id: Uuid::nil(),
            family: "web".into(),
            revision: 1,
            arn: String::new(),
            status: TaskDefinitionStatus::Active,
            network_mode: Default::default(),
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
    fn replica_count_matches_desired_count() {
        let service = sample_service();
        let materialization = build_deployment(&service, "default", &sample_task_definition());
        assert_eq!(materialization.deployment.spec.unwrap().replicas, Some(3));
    }

    #[test]
    fn selector_and_template_labels_match() {
        let service = sample_service();
        let materialization = build_deployment(&service, "default", &sample_task_definition());
        let spec = materialization.deployment.spec.unwrap();
        assert_eq!(
            spec.selector.match_labels,
            spec.template.metadata.unwrap().labels
        );
    }

    #[test]
    fn deployment_pod_template_always_restarts_even_with_non_essential_only_containers() {
        let mut task_definition = sample_task_definition();
        task_definition.container_definitions = sqlx::types::Json(vec![ContainerDefinition {
            name: "sidecar".into(),
            image: "busybox".into(),
            essential: Some(false),
            ..Default::default()
        }]);
        let service = sample_service();
        let materialization = build_deployment(&service, "default", &task_definition);
        let pod_spec = materialization.deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Always"));
    }

    #[test]
    fn task_role_arn_produces_service_account_and_annotation() {
        let mut task_definition = sample_task_definition();
        task_definition.task_role_arn = Some("arn:aws:iam::000000000000:role/web-role".into());
        let service = sample_service();
        let materialization = build_deployment(&service, "default", &task_definition);

        let service_account = materialization.service_account.expect("service account expected");
        assert_eq!(service_account.metadata.name.as_deref(), Some("ecs-task-role-web-role"));

        let pod_template = materialization.deployment.spec.unwrap().template;
        assert_eq!(
            pod_template.spec.unwrap().service_account_name.as_deref(),
            Some("ecs-task-role-web-role")
        );
        let annotations = pod_template.metadata.unwrap().annotations.unwrap();
        assert_eq!(
            annotations.get(ANNOTATION_TASK_ROLE_ARN).unwrap(),
            "arn:aws:iam::000000000000:role/web-role"
        );
    }

    #[test]
    fn awsvpc_network_mode_annotates_subnets_and_security_groups() {
        let mut task_definition = sample_task_definition();
        task_definition.network_mode = NetworkMode::Awsvpc;
        let mut service = sample_service();
        service.network_configuration = sqlx::types::Json(Some(serde_json::json!({
            "awsvpcConfiguration": {
                "subnets": ["subnet-1", "subnet-2"],
                "securityGroups": ["sg-1"],
            }
        })));

        let materialization = build_deployment(&service, "default", &task_definition);
        let annotations = materialization
            .deployment
            .spec
            .unwrap()
            .template
            .metadata
            .unwrap()
            .annotations
            .unwrap();
        assert_eq!(annotations.get(ANNOTATION_SUBNETS).unwrap(), "subnet-1,subnet-2");
        assert_eq!(annotations.get(ANNOTATION_SECURITY_GROUPS).unwrap(), "sg-1");
    }
}
