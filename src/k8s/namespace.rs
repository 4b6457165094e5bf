use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::collections::BTreeMap;

use crate::k8s::{FIELD_MANAGER, LABEL_CLUSTER, LABEL_MANAGED_BY, MANAGED_BY_VALUE};

fn common_labels(cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());
    labels
}

fn build_namespace(name: &str, cluster_name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(common_labels(cluster_name)),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn build_service_account(namespace: &str, cluster_name: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some("kecs-default".to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(common_labels(cluster_name)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Ensures the namespace and its default ServiceAccount exist for a cluster,
/// via server-side apply so repeated calls (e.g. during recovery,
/// spec.md §4.4) are no-ops once converged.
pub async fn ensure(client: &Client, namespace: &str, cluster_name: &str) -> Result<(), kube::Error> {
    let ns_api: Api<Namespace> = Api::all(client.clone());
    let patch_params = PatchParams::apply(FIELD_MANAGER).force();
    let ns = build_namespace(namespace, cluster_name);
    ns_api
        .patch(namespace, &patch_params, &Patch::Apply(&ns))
        .await?;

    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let sa = build_service_account(namespace, cluster_name);
    sa_api
        .patch("kecs-default", &patch_params, &Patch::Apply(&sa))
        .await?;

    Ok(())
}
