use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use super::ServiceDiscovery;
use crate::model::Task;

/// Invoked by the reconciler's batch flush when a task's `LastStatus`
/// transitions to RUNNING (spec.md §4.3: "the updater fetches the Pod and
/// invokes the external `TaskUpdater` collaborator"). The Pod handed in is
/// the same `Arc<Pod>` the informer cache produced the observation from —
/// there is no second live fetch.
#[async_trait]
pub trait TaskUpdater: Send + Sync {
    async fn task_running(&self, task: &Task, pod: &Pod);
}

/// Default wiring: a RUNNING transition triggers service-discovery
/// registration using the pod's assigned IP, mirroring ECS's own behavior of
/// registering a task with its service's Cloud Map namespace once it
/// reaches RUNNING.
pub struct ServiceDiscoveryTaskUpdater {
    service_discovery: Arc<dyn ServiceDiscovery>,
}

impl ServiceDiscoveryTaskUpdater {
    pub fn new(service_discovery: Arc<dyn ServiceDiscovery>) -> Self {
        Self { service_discovery }
    }
}

#[async_trait]
impl TaskUpdater for ServiceDiscoveryTaskUpdater {
    async fn task_running(&self, task: &Task, pod: &Pod) {
        let pod_ip = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref());
        if let Err(err) = self.service_discovery.register(&task.task_arn, pod_ip).await {
            tracing::warn!(task_arn = %task.task_arn, %err, "service-discovery registration failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HealthStatus, LastStatus, Tags};
    use chrono::Utc;
    use k8s_openapi::api::core::v1::PodStatus;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingServiceDiscovery {
        called: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServiceDiscovery for RecordingServiceDiscovery {
        async fn register(&self, task_arn: &str, _pod_ip: Option<&str>) -> anyhow::Result<()> {
            self.called.lock().unwrap().push(task_arn.to_string());
            Ok(())
        }
    }

    fn sample_task() -> Task {
        Task {
            id: Uuid::nil(),
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/default".into(),
            task_arn: "arn:aws:ecs:us-east-1:000000000000:task/default/abc".into(),
            task_definition_arn: String::new(),
            group: None,
            last_status: LastStatus::Running,
            desired_status: LastStatus::Running,
            health_status: HealthStatus::Unknown,
            pod_name: None,
            namespace: None,
            client_token: None,
            started_at: None,
            stopped_at: None,
            stopped_reason: None,
            container_states: sqlx::types::Json(Vec::new()),
            tags: sqlx::types::Json(Tags::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn running_transition_triggers_registration() {
        let recorder = Arc::new(RecordingServiceDiscovery { called: Mutex::new(Vec::new()) });
        let updater = ServiceDiscoveryTaskUpdater::new(recorder.clone());

        let task = sample_task();
        let mut pod = Pod::default();
        pod.status = Some(PodStatus {
            pod_ip: Some("10.0.0.5".into()),
            ..Default::default()
        });

        updater.task_running(&task, &pod).await;
        assert_eq!(
            recorder.called.lock().unwrap().as_slice(),
            ["arn:aws:ecs:us-east-1:000000000000:task/default/abc"]
        );
    }
}
