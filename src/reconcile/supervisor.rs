use std::collections::HashMap;
use std::sync::Arc;

use kube::Client;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ReconcilerSettings;
use crate::integrations::TaskUpdater;
use crate::store::Store;

use super::Reconciler;

/// KECS runs one Kubernetes substrate per ECS cluster (spec.md §4.2), so
/// unlike the teacher's single `run_kubernetes_controller_loop` this process
/// owns one reconciler per cluster, started lazily the first time a cluster
/// is seen (at recovery or right after `CreateCluster` provisions it).
pub struct Supervisor {
    store: Store,
    settings: ReconcilerSettings,
    task_updater: Arc<dyn TaskUpdater>,
    cancellation: CancellationToken,
    reconcilers: Mutex<HashMap<String, Reconciler>>,
}

impl Supervisor {
    pub fn new(
        store: Store,
        settings: ReconcilerSettings,
        task_updater: Arc<dyn TaskUpdater>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            store,
            settings,
            task_updater,
            cancellation,
            reconcilers: Mutex::new(HashMap::new()),
        }
    }

    /// No-op if a reconciler is already running for `k8s_cluster_name`.
    pub async fn ensure_started(&self, k8s_cluster_name: &str, client: Client) {
        let mut reconcilers = self.reconcilers.lock().await;
        if reconcilers.contains_key(k8s_cluster_name) {
            return;
        }
        info!(cluster = k8s_cluster_name, "starting reconciler");
        let reconciler = super::spawn(
            client,
            self.store.clone(),
            self.settings.clone(),
            self.task_updater.clone(),
            self.cancellation.child_token(),
        )
        .await;
        reconcilers.insert(k8s_cluster_name.to_string(), reconciler);
    }

    /// Cancels every child token and joins all worker/batch tasks. Bounded by
    /// each reconciler's own `shutdown_grace_secs` batch flush, not by this
    /// function.
    pub async fn shutdown(self) {
        self.cancellation.cancel();
        let reconcilers = self.reconcilers.into_inner();
        for (name, reconciler) in reconcilers {
            for handle in reconciler.handles {
                if let Err(err) = handle.await {
                    tracing::warn!(cluster = %name, %err, "reconciler task panicked during shutdown");
                }
            }
        }
    }
}
