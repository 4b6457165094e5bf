use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tracing::{error, warn};

use crate::reconcile::queue::WorkQueue;

/// Watch-driven lister caches for the two kinds KECS reconciles, per
/// spec.md §4.3/§9: no polling loop ever lists the cluster on a timer, all
/// of reality is learned from the watch stream and kept in `reflector::Store`
/// for the mappers to read back without an extra API round-trip.
pub struct Informers {
    pub pods: Store<Pod>,
    pub deployments: Store<Deployment>,
}

/// Starts the Pod and Deployment watchers, each feeding `queue` with the
/// namespaced key of whatever changed. Returns immediately; the watchers run
/// on spawned tasks for the lifetime of the process (or until `Informers` is
/// dropped, which is only at shutdown).
pub fn start(client: Client, queue: Arc<WorkQueue>) -> Informers {
    let pods: Api<Pod> = Api::all(client.clone());
    let (pod_reader, pod_writer) = reflector::store();
    let pod_queue = queue.clone();
    tokio::spawn(async move {
        let stream = watcher(pods, watcher::Config::default())
            .default_backoff()
            .reflect(pod_writer)
            .applied_objects();
        tokio::pin!(stream);
        while let Some(event) = stream.next().await {
            match event {
                Ok(pod) => pod_queue.add(pod_key(&pod)),
                Err(err) => warn!(error = %err, "pod watcher error"),
            }
        }
        error!("pod watcher stream ended");
    });

    let deployments: Api<Deployment> = Api::all(client.clone());
    let (deployment_reader, deployment_writer) = reflector::store();
    let deployment_queue = queue.clone();
    tokio::spawn(async move {
        let stream = watcher(deployments, watcher::Config::default())
            .default_backoff()
            .reflect(deployment_writer)
            .applied_objects();
        tokio::pin!(stream);
        while let Some(event) = stream.next().await {
            match event {
                Ok(deployment) => deployment_queue.add(deployment_key(&deployment)),
                Err(err) => warn!(error = %err, "deployment watcher error"),
            }
        }
        error!("deployment watcher stream ended");
    });

    Informers {
        pods: pod_reader,
        deployments: deployment_reader,
    }
}

pub fn pod_key(pod: &Pod) -> String {
    format!(
        "pod/{}/{}",
        pod.namespace().unwrap_or_default(),
        pod.name_any()
    )
}

pub fn deployment_key(deployment: &Deployment) -> String {
    format!(
        "deployment/{}/{}",
        deployment.namespace().unwrap_or_default(),
        deployment.name_any()
    )
}
