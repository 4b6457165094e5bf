use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod as PodResource;
use kube::runtime::reflector::ObjectRef;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::integrations::TaskUpdater;
use crate::reconcile::batch::BatchUpdater;
use crate::reconcile::informer::Informers;
use crate::reconcile::mapper::{deployment_to_service, pod_to_task};
use crate::reconcile::queue::WorkQueue;
use crate::store::Store;

/// Staged write for a single task, keyed by `task_arn` in the batch updater
/// so repeated pod events for the same task coalesce (spec.md §4.3). Carries
/// the informer-cached Pod forward so a RUNNING transition can hand it to
/// the `TaskUpdater` collaborator without a second live fetch.
#[derive(Clone)]
pub struct TaskUpdate {
    pub task_arn: String,
    pub observation: pod_to_task::PodObservation,
    pub pod: Arc<PodResource>,
}

/// Staged write for a single service, keyed by service `arn`.
#[derive(Clone)]
pub struct ServiceUpdate {
    pub service_arn: String,
    pub observation: deployment_to_service::DeploymentObservation,
}

/// Spawns `worker_count` tasks pulling keys off `queue`, mapping the
/// informer-cached object to a store update, and staging it on the
/// appropriate batch updater. Each worker runs until `cancellation` fires.
pub fn spawn(
    worker_count: usize,
    store: Store,
    informers: Arc<Informers>,
    queue: Arc<WorkQueue>,
    task_batch: Arc<BatchUpdater<TaskUpdate>>,
    service_batch: Arc<BatchUpdater<ServiceUpdate>>,
    cancellation: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|id| {
            let store = store.clone();
            let informers = informers.clone();
            let queue = queue.clone();
            let task_batch = task_batch.clone();
            let service_batch = service_batch.clone();
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                loop {
                    let key = tokio::select! {
                        key = queue.get() => key,
                        _ = cancellation.cancelled() => return,
                    };

                    let outcome = process_key(&key, &store, &informers, &task_batch, &service_batch).await;
                    match outcome {
                        Ok(()) => queue.forget(&key),
                        Err(err) => {
                            warn!(worker = id, key = %key, error = %err, "reconcile failed, requeueing");
                            if !queue.add_rate_limited(key.clone()) {
                                error!(key = %key, "giving up after exceeding max requeues");
                            }
                        }
                    }
                    queue.mark_done(&key);
                }
            })
        })
        .collect()
}

async fn process_key(
    key: &str,
    store: &Store,
    informers: &Informers,
    task_batch: &BatchUpdater<TaskUpdate>,
    service_batch: &BatchUpdater<ServiceUpdate>,
) -> anyhow::Result<()> {
    let (kind, rest) = key.split_once('/').ok_or_else(|| anyhow::anyhow!("malformed key"))?;
    let (namespace, name) = rest.split_once('/').ok_or_else(|| anyhow::anyhow!("malformed key"))?;

    match kind {
        "pod" => reconcile_pod(namespace, name, store, informers, task_batch).await,
        "deployment" => reconcile_deployment(namespace, name, store, informers, service_batch).await,
        other => {
            error!(kind = other, "unknown work queue key kind");
            Ok(())
        }
    }
}

async fn reconcile_pod(
    namespace: &str,
    name: &str,
    store: &Store,
    informers: &Informers,
    task_batch: &BatchUpdater<TaskUpdate>,
) -> anyhow::Result<()> {
    let object_ref: ObjectRef<k8s_openapi::api::core::v1::Pod> =
        ObjectRef::new(name).within(namespace);
    let Some(pod) = informers.pods.get(&object_ref) else {
        return Ok(());
    };

    let Some(observation) = pod_to_task::map(&pod) else {
        return Ok(());
    };

    let Some(task) = crate::store::tasks::find_by_pod_name(&store.pool, namespace, name).await? else {
        return Ok(());
    };

    task_batch.stage(
        task.task_arn.clone(),
        TaskUpdate {
            task_arn: task.task_arn,
            observation,
            pod,
        },
    );
    Ok(())
}

async fn reconcile_deployment(
    namespace: &str,
    name: &str,
    store: &Store,
    informers: &Informers,
    service_batch: &BatchUpdater<ServiceUpdate>,
) -> anyhow::Result<()> {
    let object_ref: ObjectRef<k8s_openapi::api::apps::v1::Deployment> =
        ObjectRef::new(name).within(namespace);
    let Some(deployment) = informers.deployments.get(&object_ref) else {
        return Ok(());
    };

    let Some(observation) = deployment_to_service::map(&deployment) else {
        return Ok(());
    };

    let Some(service) = sqlx::query_as::<_, crate::model::Service>(
        "SELECT * FROM services WHERE namespace = $1 AND deployment_name = $2",
    )
    .bind(namespace)
    .bind(name)
    .fetch_optional(&store.pool)
    .await?
    else {
        return Ok(());
    };

    service_batch.stage(
        service.arn.clone(),
        ServiceUpdate {
            service_arn: service.arn,
            observation,
        },
    );
    Ok(())
}

/// Applies a flushed batch of task observations to the store, invokes the
/// `TaskUpdater` collaborator for any task that just transitioned to
/// RUNNING (spec.md §4.3, §6), then refreshes the owning clusters'
/// denormalized counters.
pub async fn flush_task_updates(
    store: &Store,
    task_updater: &Arc<dyn TaskUpdater>,
    batch: std::collections::HashMap<String, TaskUpdate>,
) {
    let mut touched_clusters = std::collections::HashSet::new();
    for update in batch.into_values() {
        let previous_status = match crate::store::tasks::find_by_arn(&store.pool, &update.task_arn).await {
            Ok(task) => task.map(|t| t.last_status),
            Err(err) => {
                error!(task_arn = %update.task_arn, error = %err, "failed to load prior task status");
                None
            }
        };

        let observation = update.observation;
        match crate::store::tasks::apply_status(
            &store.pool,
            &update.task_arn,
            observation.last_status,
            observation.health_status,
            observation.container_states,
            observation.started_at,
            observation.stopped_at,
            observation.stopped_reason,
        )
        .await
        {
            Ok(Some(task)) => {
                touched_clusters.insert(task.cluster_arn.clone());
                if task.last_status == crate::model::LastStatus::Running
                    && previous_status != Some(crate::model::LastStatus::Running)
                {
                    task_updater.task_running(&task, &update.pod).await;
                }
            }
            Ok(None) => {}
            Err(err) => error!(task_arn = %update.task_arn, error = %err, "failed to apply task status"),
        }
    }
    for cluster_arn in touched_clusters {
        if let Err(err) = crate::store::clusters::refresh_counters(&store.pool, &cluster_arn).await {
            error!(cluster_arn = %cluster_arn, error = %err, "failed to refresh cluster counters");
        }
    }
}

/// Applies a flushed batch of service observations to the store.
pub async fn flush_service_updates(store: &Store, batch: std::collections::HashMap<String, ServiceUpdate>) {
    for update in batch.into_values() {
        if let Err(err) = crate::store::services::update_counts(
            &store.pool,
            &update.service_arn,
            update.observation.running_count,
            update.observation.pending_count,
        )
        .await
        {
            error!(service_arn = %update.service_arn, error = %err, "failed to apply service counts");
        }
    }
}
