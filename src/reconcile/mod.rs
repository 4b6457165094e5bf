pub mod batch;
pub mod informer;
pub mod mapper;
pub mod queue;
pub mod supervisor;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ReconcilerSettings;
use crate::integrations::TaskUpdater;
use crate::store::Store;

/// Wires the informers, work queue, worker pool, and batch updaters into a
/// single running reconciler (spec.md §4.3/§9). Returns the task handles so
/// the caller can join them during graceful shutdown.
pub struct Reconciler {
    pub handles: Vec<tokio::task::JoinHandle<()>>,
}

pub async fn spawn(
    client: Client,
    store: Store,
    settings: ReconcilerSettings,
    task_updater: Arc<dyn TaskUpdater>,
    cancellation: CancellationToken,
) -> Reconciler {
    let queue = Arc::new(queue::WorkQueue::new(settings.max_requeues));
    let informers = Arc::new(informer::start(client, queue.clone()));

    let task_batch = Arc::new(batch::BatchUpdater::<worker::TaskUpdate>::new(settings.flush_threshold));
    let service_batch = Arc::new(batch::BatchUpdater::<worker::ServiceUpdate>::new(settings.flush_threshold));

    let mut handles = worker::spawn(
        settings.worker_count,
        store.clone(),
        informers,
        queue,
        task_batch.clone(),
        service_batch.clone(),
        cancellation.clone(),
    );

    let flush_interval = Duration::from_secs(settings.flush_interval_secs);
    let shutdown_grace = Duration::from_secs(settings.shutdown_grace_secs);

    let task_store = store.clone();
    let task_cancellation = cancellation.clone();
    handles.push(tokio::spawn(async move {
        task_batch
            .run(flush_interval, shutdown_grace, task_cancellation, |batch| {
                let store = task_store.clone();
                let task_updater = task_updater.clone();
                async move { worker::flush_task_updates(&store, &task_updater, batch).await }
            })
            .await;
    }));

    let service_store = store.clone();
    let service_cancellation = cancellation.clone();
    handles.push(tokio::spawn(async move {
        service_batch
            .run(flush_interval, shutdown_grace, service_cancellation, |batch| {
                let store = service_store.clone();
                async move { worker::flush_service_updates(&store, batch).await }
            })
            .await;
    }));

    info!(workers = settings.worker_count, "reconciler started");
    Reconciler { handles }
}
