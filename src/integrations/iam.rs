use async_trait::async_trait;

/// Maps ECS IAM task roles onto Kubernetes RBAC structurally (spec.md §1
/// Non-goals: "full IAM policy evaluation" is out of scope). The core only
/// needs the ServiceAccount identity a role resolves to; this trait is the
/// seam a real deployment would use to back that resolution with actual
/// IAM/EKS IRSA role-chaining instead of the local derivation.
#[async_trait]
pub trait Iam: Send + Sync {
    async fn resolve_role(&self, role_arn: &str) -> anyhow::Result<RoleBinding>;
}

#[derive(Debug, Clone)]
pub struct RoleBinding {
    pub role_arn: String,
    pub service_account_annotation: String,
}

/// No real IAM calls — the binding is derived structurally from the ARN,
/// matching `TaskDefinition::task_role_service_account_name`.
#[derive(Debug, Default)]
pub struct LocalIam;

#[async_trait]
impl Iam for LocalIam {
    async fn resolve_role(&self, role_arn: &str) -> anyhow::Result<RoleBinding> {
        Ok(RoleBinding {
            role_arn: role_arn.to_string(),
            service_account_annotation: crate::k8s::ANNOTATION_IAM_ROLE_ARN.to_string(),
        })
    }
}
