use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::k8s::{ANNOTATION_IAM_ROLE_ARN, LABEL_CLUSTER, LABEL_MANAGED_BY, MANAGED_BY_VALUE};

/// Translates an ECS task role into a ServiceAccount carrying an IRSA-style
/// role-arn annotation, so pods that mount it present the same role-based
/// identity convention a real EKS cluster uses (spec.md §4.2 "IAM task role
/// becomes an annotation and a ServiceAccount with matching name and role
/// annotations").
pub fn build_task_role_service_account(
    name: &str,
    namespace: &str,
    cluster_name: &str,
    role_arn: &str,
) -> ServiceAccount {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_IAM_ROLE_ARN.to_string(), role_arn.to_string());

    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_arn_becomes_irsa_annotation() {
        let sa = build_task_role_service_account(
            "ecs-task-role-x",
            "default-us-east-1",
            "default",
            "arn:aws:iam::000000000000:role/x",
        );
        let annotations = sa.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(ANNOTATION_IAM_ROLE_ARN).unwrap(),
            "arn:aws:iam::000000000000:role/x"
        );
        assert_eq!(sa.metadata.name.as_deref(), Some("ecs-task-role-x"));
    }
}
