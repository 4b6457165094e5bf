use anyhow::Context;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use kube::api::{Api, Patch, PatchParams};
use tracing::{info, warn};

use crate::config::Settings;
use crate::k8s::provisioner::K3dProvisioner;
use crate::k8s::translate::deployment::build_deployment;
use crate::k8s::FIELD_MANAGER;
use crate::model::{ClusterStatus, ServiceStatus};
use crate::reconcile::supervisor::Supervisor;
use crate::store::{clusters, services, task_definitions, Store};

/// Re-establishes everything the server needs to keep reconciling after a
/// restart (spec.md §4.4 "Startup recovery"): re-provisions each stored
/// cluster's k3d substrate and namespace, reapplies every active service's
/// Deployment from the Store's recorded desired state, and starts that
/// cluster's reconciler. A crash mid-`RunTask`/`CreateService` leaves the
/// Store as the only durable record of intent — Kubernetes objects are
/// always re-derived from it, never the other way around.
///
/// Open question resolved here: a service's Deployment is rebuilt from
/// `task_definition_arn` exactly as recorded on the service row, even if
/// that revision has since been deregistered (INACTIVE). Deregistering a
/// task definition does not touch services already running it (spec.md
/// §4.1 "DeregisterTaskDefinition"), so recovery must not silently promote
/// a service to a newer revision it never asked for.
pub async fn recover(store: &Store, settings: &Settings, reconcilers: &Supervisor) -> anyhow::Result<()> {
    let provisioner = K3dProvisioner::new(settings.k3d.clone());
    if let Err(err) = provisioner.ensure_cli_available().await {
        warn!(%err, "k3d CLI not available; skipping cluster substrate recovery");
        return Ok(());
    }

    let all_clusters = clusters::list(&store.pool).await?;
    let active_clusters: Vec<_> = all_clusters
        .into_iter()
        .filter(|c| c.status != ClusterStatus::Inactive)
        .collect();

    info!(count = active_clusters.len(), "recovering cluster substrates");

    for cluster in active_clusters {
        let kubeconfig_path = provisioner
            .create(&cluster.k8s_cluster_name)
            .await
            .with_context(|| format!("failed to provision k3d cluster {}", cluster.k8s_cluster_name))?;

        let client = crate::k8s::client::client_for_kubeconfig(&kubeconfig_path).await?;
        let namespace = cluster.namespace(&settings.aws.region);
        crate::k8s::namespace::ensure(&client, &namespace, &cluster.name).await?;

        let cluster_services = services::list_by_cluster(&store.pool, &cluster.arn).await?;
        for service in cluster_services.into_iter().filter(|s| s.status == ServiceStatus::Active) {
            let task_definition = match task_definitions::find_by_arn(&store.pool, &service.task_definition_arn).await? {
                Some(task_definition) => task_definition,
                None => {
                    warn!(
                        service = %service.service_name,
                        task_definition = %service.task_definition_arn,
                        "service references a task definition that no longer exists; skipping Deployment recovery"
                    );
                    continue;
                }
            };

            let materialization = build_deployment(&service, &cluster.name, &task_definition);
            let params = PatchParams::apply(FIELD_MANAGER).force();

            if let Some(service_account) = &materialization.service_account {
                let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &service.namespace);
                let name = service_account.metadata.name.as_deref().unwrap_or_default();
                sa_api
                    .patch(name, &params, &Patch::Apply(service_account))
                    .await
                    .with_context(|| format!("failed to reapply ServiceAccount for service {}", service.service_name))?;
            }

            let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), &service.namespace);
            for configmap in &materialization.configmaps {
                let name = configmap.metadata.name.as_deref().unwrap_or_default();
                cm_api
                    .patch(name, &params, &Patch::Apply(configmap))
                    .await
                    .with_context(|| format!("failed to reapply ConfigMap for service {}", service.service_name))?;
            }

            let api: Api<Deployment> = Api::namespaced(client.clone(), &service.namespace);
            api.patch(
                &service.deployment_name,
                &params,
                &Patch::Apply(&materialization.deployment),
            )
            .await
            .with_context(|| format!("failed to reapply Deployment for service {}", service.service_name))?;
        }

        reconcilers.ensure_started(&cluster.k8s_cluster_name, client).await;
        info!(cluster = %cluster.name, "cluster substrate recovered");
    }

    Ok(())
}
