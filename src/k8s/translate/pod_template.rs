use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvFromSource, EnvVar,
    ExecAction, PodSpec, Probe, ResourceRequirements, SecretEnvSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ContainerDefinition, HealthCheck, NetworkMode, TaskDefinition};

/// `amazon/aws-for-fluent-bit` is the log-shipper image AWS itself ships for
/// sidecar-based CloudWatch forwarding; used here as a structural stand-in
/// for the real awslogs driver (spec.md §4.2, §9 open question).
pub const AWSLOGS_SIDECAR_IMAGE: &str = "amazon/aws-for-fluent-bit:2.32.0";

/// Translates a task definition's containers into a `PodSpec`. Shared by both
/// the long-running (`translate::deployment`) and one-shot
/// (`translate::task_pod`) materializers, since ECS draws no distinction
/// between the two at the container-definition level (spec.md §4.2).
///
/// Pure function: no I/O, no cluster state. Given the same task definition it
/// always produces the same spec, which is what lets the reconciler re-derive
/// desired state on every informer event instead of diffing by hand.
///
/// `namespace`/`name_prefix` only matter when a container's `logConfiguration`
/// uses the `awslogs` driver — they name the ConfigMap materialized alongside
/// the sidecar, returned in the second element so the caller can apply it
/// before (or alongside) the Pod/Deployment that mounts it.
pub fn build_pod_spec(
    task_definition: &TaskDefinition,
    service_account_name: Option<String>,
    namespace: &str,
    name_prefix: &str,
) -> (PodSpec, Vec<ConfigMap>) {
    let mut containers = Vec::new();
    let mut volumes = Vec::new();
    let mut configmaps = Vec::new();
    let mut has_sidecar = false;

    for def in &task_definition.container_definitions.0 {
        containers.push(build_container(def));
        if let Some((sidecar, configmap, volume)) = build_awslogs_sidecar(def, namespace, name_prefix) {
            has_sidecar = true;
            containers.push(sidecar);
            volumes.push(volume);
            configmaps.push(configmap);
        }
    }

    let pod_spec = PodSpec {
        containers,
        volumes: if volumes.is_empty() { None } else { Some(volumes) },
        service_account_name,
        host_network: matches!(task_definition.network_mode, NetworkMode::Host),
        restart_policy: Some(restart_policy_for(task_definition)),
        // Lets the awslogs sidecar read a sibling container's stdout via
        // `/proc/<pid>/fd/1` without an extra shared volume.
        share_process_namespace: if has_sidecar { Some(true) } else { None },
        ..Default::default()
    };

    (pod_spec, configmaps)
}

/// ECS's `essential` flag has no direct Kubernetes pod-level equivalent —
/// `restartPolicy` applies to every container in the pod, not one at a time.
/// A task with at least one essential container should come back when it
/// exits (`Always`); a task made up entirely of best-effort containers
/// should not be endlessly relaunched (`OnFailure`). `essential` defaults to
/// `true` when unset, matching ECS's own "at least one essential container"
/// requirement (spec.md §4.2 "restartPolicy inferred from essentiality").
fn restart_policy_for(task_definition: &TaskDefinition) -> String {
    let any_essential = task_definition
        .container_definitions
        .0
        .iter()
        .any(|def| def.essential.unwrap_or(true));
    if any_essential {
        "Always".to_string()
    } else {
        "OnFailure".to_string()
    }
}

fn build_container(def: &ContainerDefinition) -> Container {
    let env = build_env(def);
    let env_from = build_env_from(def);
    let resources = build_resources(def);
    let ports = build_ports(def);
    let probe = def.health_check.as_ref().map(build_probe);

    Container {
        name: def.name.clone(),
        image: Some(def.image.clone()),
        command: if def.command.is_empty() {
            None
        } else {
            Some(def.command.clone())
        },
        env: if env.is_empty() { None } else { Some(env) },
        env_from: if env_from.is_empty() { None } else { Some(env_from) },
        ports: if ports.is_empty() { None } else { Some(ports) },
        resources,
        liveness_probe: probe.clone(),
        readiness_probe: probe,
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    }
}

fn build_env(def: &ContainerDefinition) -> Vec<EnvVar> {
    def.environment
        .iter()
        .map(|kv| EnvVar {
            name: kv.name.clone(),
            value: Some(kv.value.clone()),
            ..Default::default()
        })
        .collect()
}

/// ECS `secrets` reference a pre-synced Secret/ConfigMap by name; rather than
/// projecting one env var per key (`secretKeyRef`), the whole object is
/// pulled in via `envFrom` — an external sync process (the §6 SSM/Secrets
/// Manager integration) is what actually populates these objects, and KECS
/// only needs to reference them (spec.md §4.2).
fn build_env_from(def: &ContainerDefinition) -> Vec<EnvFromSource> {
    let mut seen = BTreeSet::new();
    def.secrets
        .iter()
        .filter_map(|secret| {
            let secret_name = secret
                .value_from
                .split_once(':')
                .map(|(name, _)| name)
                .unwrap_or(secret.value_from.as_str());
            if !seen.insert(secret_name.to_string()) {
                return None;
            }
            Some(EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: secret_name.to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            })
        })
        .collect()
}

fn build_ports(def: &ContainerDefinition) -> Vec<ContainerPort> {
    def.port_mappings
        .iter()
        .map(|pm| ContainerPort {
            container_port: pm.container_port as i32,
            protocol: pm.protocol.clone().map(|p| p.to_uppercase()),
            ..Default::default()
        })
        .collect()
}

/// ECS `cpu` is CPU units (1024 = 1 vCPU); `memory` is mebibytes. Both map to
/// Kubernetes resource requests/limits the same way for simplicity — the
/// emulator does not distinguish request from limit (spec.md §4.2 Non-goals).
fn build_resources(def: &ContainerDefinition) -> Option<ResourceRequirements> {
    let mut limits = BTreeMap::new();
    if let Some(cpu) = def.cpu {
        let vcpus = cpu as f64 / 1024.0;
        limits.insert("cpu".to_string(), Quantity(format!("{vcpus:.3}")));
    }
    if let Some(memory) = def.memory {
        limits.insert("memory".to_string(), Quantity(format!("{memory}Mi")));
    }
    if limits.is_empty() {
        None
    } else {
        Some(ResourceRequirements {
            limits: Some(limits.clone()),
            requests: Some(limits),
            ..Default::default()
        })
    }
}

/// ECS healthCheck commands follow Docker's convention: `CMD-SHELL` wraps its
/// single argument in a shell, `CMD` passes the remaining args through
/// directly. Both liveness and readiness read from the same ECS healthCheck —
/// ECS has no equivalent of Kubernetes' separate readiness concept — so the
/// translated container gets the same `Probe` for both (spec.md §4.2
/// "livenessProbe/readinessProbe from healthCheck").
fn build_probe(health_check: &HealthCheck) -> Probe {
    let command = match health_check.command.split_first() {
        Some((head, rest)) if head == "CMD-SHELL" => {
            vec!["sh".to_string(), "-c".to_string(), rest.join(" ")]
        }
        Some((head, rest)) if head == "CMD" => rest.to_vec(),
        _ => health_check.command.clone(),
    };

    Probe {
        exec: Some(ExecAction { command: Some(command) }),
        initial_delay_seconds: health_check.start_period,
        period_seconds: health_check.interval.or(Some(30)),
        timeout_seconds: health_check.timeout.or(Some(5)),
        failure_threshold: health_check.retries.or(Some(3)),
        ..Default::default()
    }
}

fn awslogs_volume_name(container_name: &str) -> String {
    format!("{container_name}-awslogs-config")
}

/// Materializes the `awslogs` log driver as a sidecar container reading a
/// mounted ConfigMap's log-shipper config, since Kubernetes has no built-in
/// CloudWatch log driver (spec.md §4.2, §9 open question). Returns `None`
/// for any other (or absent) log driver.
fn build_awslogs_sidecar(
    def: &ContainerDefinition,
    namespace: &str,
    name_prefix: &str,
) -> Option<(Container, ConfigMap, Volume)> {
    let log_configuration = def.log_configuration.as_ref()?;
    if log_configuration.log_driver != "awslogs" {
        return None;
    }

    let configmap_name = format!("{name_prefix}-{}-awslogs", def.name);
    let volume_name = awslogs_volume_name(&def.name);
    let group = log_configuration.options.get("awslogs-group").cloned().unwrap_or_default();
    let region = log_configuration.options.get("awslogs-region").cloned().unwrap_or_default();
    let stream_prefix = log_configuration
        .options
        .get("awslogs-stream-prefix")
        .cloned()
        .unwrap_or_default();

    let mut data = BTreeMap::new();
    data.insert(
        "fluent-bit.conf".to_string(),
        format!(
            "[OUTPUT]\n    Name cloudwatch_logs\n    Match *\n    region {region}\n    log_group_name {group}\n    log_stream_prefix {stream_prefix}\n"
        ),
    );

    let configmap = ConfigMap {
        metadata: ObjectMeta {
            name: Some(configmap_name.clone()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    let volume = Volume {
        name: volume_name.clone(),
        config_map: Some(ConfigMapVolumeSource {
            name: configmap_name,
            ..Default::default()
        }),
        ..Default::default()
    };

    let sidecar = Container {
        name: format!("{}-awslogs", def.name),
        image: Some(AWSLOGS_SIDECAR_IMAGE.to_string()),
        volume_mounts: Some(vec![VolumeMount {
            name: volume_name,
            mount_path: "/fluent-bit/etc/fluent-bit.conf".to_string(),
            sub_path: Some("fluent-bit.conf".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Some((sidecar, configmap, volume))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ContainerDefinition, KeyValuePair, LogConfiguration, NetworkMode, PortMapping,
        TaskDefinitionStatus,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_task_definition(containers: Vec<ContainerDefinition>) -> TaskDefinition {
        TaskDefinition {
            id: Uuid::nil(),
            family: "web".into(),
            revision: 1,
            arn: String::new(),
            status: TaskDefinitionStatus::Active,
            network_mode: NetworkMode::Bridge,
            container_definitions: sqlx::types::Json(containers),
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
    fn translates_env_and_ports() {
        let container = ContainerDefinition {
            name: "app".into(),
            image: "nginx:latest".into(),
            cpu: Some(512),
            memory: Some(256),
            environment: vec![KeyValuePair {
                name: "FOO".into(),
                value: "bar".into(),
            }],
            port_mappings: vec![PortMapping {
                container_port: 8080,
                host_port: None,
                protocol: Some("tcp".into()),
            }],
            ..Default::default()
        };
        let task_definition = sample_task_definition(vec![container]);

        let (spec, configmaps) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");
        assert!(configmaps.is_empty());
        assert_eq!(spec.containers.len(), 1);
        let container = &spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("nginx:latest"));
        assert_eq!(container.env.as_ref().unwrap()[0].name, "FOO");
        assert_eq!(
            container.ports.as_ref().unwrap()[0].container_port,
            8080
        );
        assert_eq!(
            container.ports.as_ref().unwrap()[0].protocol.as_deref(),
            Some("TCP")
        );
    }

    #[test]
    fn host_network_mode_sets_host_network() {
        let mut task_definition = sample_task_definition(vec![]);
        task_definition.network_mode = NetworkMode::Host;
        let (spec, _) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");
        assert!(spec.host_network);
    }

    #[test]
    fn essential_container_yields_always_restart_policy() {
        let container = ContainerDefinition {
            name: "app".into(),
            image: "nginx:latest".into(),
            essential: Some(true),
            ..Default::default()
        };
        let task_definition = sample_task_definition(vec![container]);
        let (spec, _) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");
        assert_eq!(spec.restart_policy.as_deref(), Some("Always"));
    }

    #[test]
    fn all_non_essential_containers_yield_on_failure_restart_policy() {
        let container = ContainerDefinition {
            name: "sidecar".into(),
            image: "busybox".into(),
            essential: Some(false),
            ..Default::default()
        };
        let task_definition = sample_task_definition(vec![container]);
        let (spec, _) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");
        assert_eq!(spec.restart_policy.as_deref(), Some("OnFailure"));
    }

    #[test]
    fn health_check_becomes_liveness_and_readiness_probes() {
        let container = ContainerDefinition {
            name: "app".into(),
            image: "nginx:latest".into(),
            health_check: Some(HealthCheck {
                command: vec!["CMD-SHELL".into(), "curl -f http://localhost/ || exit 1".into()],
                interval: Some(15),
                timeout: Some(3),
                retries: Some(2),
                start_period: Some(10),
            }),
            ..Default::default()
        };
        let task_definition = sample_task_definition(vec![container]);
        let (spec, _) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");
        let probe = spec.containers[0].liveness_probe.as_ref().unwrap();
        let command = probe.exec.as_ref().unwrap().command.as_ref().unwrap();
        assert_eq!(command, &vec!["sh".to_string(), "-c".to_string(), "curl -f http://localhost/ || exit 1".to_string()]);
        assert_eq!(probe.period_seconds, Some(15));
        assert_eq!(probe.failure_threshold, Some(2));
        assert!(spec.containers[0].readiness_probe.is_some());
    }

    #[test]
    fn awslogs_driver_adds_sidecar_and_configmap() {
        let container = ContainerDefinition {
            name: "app".into(),
            image: "nginx:latest".into(),
            log_configuration: Some(LogConfiguration {
                log_driver: "awslogs".into(),
                options: [
                    ("awslogs-group".to_string(), "/ecs/web".to_string()),
                    ("awslogs-region".to_string(), "us-east-1".to_string()),
                ]
                .into_iter()
                .collect(),
            }),
            ..Default::default()
        };
        let task_definition = sample_task_definition(vec![container]);
        let (spec, configmaps) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");

        assert_eq!(spec.containers.len(), 2);
        assert_eq!(spec.containers[1].name, "app-awslogs");
        assert_eq!(spec.share_process_namespace, Some(true));
        assert_eq!(configmaps.len(), 1);
        let data = configmaps[0].data.as_ref().unwrap();
        assert!(data["fluent-bit.conf"].contains("/ecs/web"));
    }

    #[test]
    fn non_awslogs_driver_adds_no_sidecar() {
        let container = ContainerDefinition {
            name: "app".into(),
            image: "nginx:latest".into(),
            log_configuration: Some(LogConfiguration {
                log_driver: "json-file".into(),
                options: Default::default(),
            }),
            ..Default::default()
        };
        let task_definition = sample_task_definition(vec![container]);
        let (spec, configmaps) = build_pod_spec(&task_definition, None, "default-us-east-1", "ecs-web");
        assert_eq!(spec.containers.len(), 1);
        assert!(configmaps.is_empty());
    }
}
