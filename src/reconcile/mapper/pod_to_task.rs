use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;

use crate::model::{ContainerState, HealthStatus, LastStatus};

/// Everything a Pod's status tells us about the task it backs. Pure
/// function of `Pod -> PodObservation`: no store access, no network I/O
/// (spec.md §4.3 "pure mapper functions").
#[derive(Debug, Clone)]
pub struct PodObservation {
    pub last_status: LastStatus,
    pub health_status: HealthStatus,
    pub container_states: Vec<ContainerState>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stopped_reason: Option<String>,
}

/// Maps a Kubernetes Pod phase/container-status snapshot onto ECS's
/// `LastStatus` state machine (spec.md §3, §4.3). `None` means the pod has
/// no status subresource yet (freshly created, not yet scheduled) —
/// callers should leave the task's status untouched rather than regress it.
pub fn map(pod: &Pod) -> Option<PodObservation> {
    let status = pod.status.as_ref()?;
    let phase = status.phase.as_deref().unwrap_or("Pending");

    let container_states = status
        .container_statuses
        .iter()
        .flatten()
        .map(|cs| {
            let (last_status, exit_code, reason) = match &cs.state {
                Some(state) if state.running.is_some() => ("RUNNING".to_string(), None, None),
                Some(state) if state.terminated.is_some() => {
                    let terminated = state.terminated.as_ref().unwrap();
                    (
                        "STOPPED".to_string(),
                        Some(terminated.exit_code),
                        terminated.reason.clone(),
                    )
                }
                Some(state) if state.waiting.is_some() => {
                    let waiting = state.waiting.as_ref().unwrap();
                    ("PENDING".to_string(), None, waiting.reason.clone())
                }
                _ => ("PENDING".to_string(), None, None),
            };
            ContainerState {
                name: cs.name.clone(),
                last_status,
                exit_code,
                reason,
                health_status: Some(if cs.ready { "HEALTHY" } else { "UNHEALTHY" }.to_string()),
            }
        })
        .collect::<Vec<_>>();

    let last_status = match phase {
        "Pending" => LastStatus::Pending,
        "Running" => LastStatus::Running,
        "Succeeded" | "Failed" => LastStatus::Stopped,
        _ => LastStatus::Pending,
    };

    let health_status = if container_states.is_empty() {
        HealthStatus::Unknown
    } else if container_states
        .iter()
        .all(|c| c.health_status.as_deref() == Some("HEALTHY"))
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let started_at = status
        .start_time
        .as_ref()
        .map(|t| t.0)
        .filter(|_| last_status >= LastStatus::Running);

    let (stopped_at, stopped_reason) = if last_status == LastStatus::Stopped {
        let reason = container_states
            .iter()
            .find_map(|c| c.reason.clone())
            .or_else(|| status.reason.clone());
        (Some(Utc::now()), reason)
    } else {
        (None, None)
    };

    Some(PodObservation {
        last_status,
        health_status,
        container_states,
        started_at,
        stopped_at,
        stopped_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerState as K8sContainerState, ContainerStateRunning, ContainerStatus, PodStatus};

    fn pod_with_phase(phase: &str) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pod_with_no_status_maps_to_none() {
        assert!(map(&Pod::default()).is_none());
    }

    #[test]
    fn running_phase_maps_to_running_status() {
        let observation = map(&pod_with_phase("Running")).unwrap();
        assert_eq!(observation.last_status, LastStatus::Running);
    }

    #[test]
    fn succeeded_phase_maps_to_stopped_with_timestamp() {
        let observation = map(&pod_with_phase("Succeeded")).unwrap();
        assert_eq!(observation.last_status, LastStatus::Stopped);
        assert!(observation.stopped_at.is_some());
    }

    #[test]
    fn all_ready_containers_are_healthy() {
        let mut pod = pod_with_phase("Running");
        pod.status.as_mut().unwrap().container_statuses = Some(vec![ContainerStatus {
            name: "app".into(),
            ready: true,
            state: Some(K8sContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        let observation = map(&pod).unwrap();
        assert_eq!(observation.health_status, HealthStatus::Healthy);
    }
}
