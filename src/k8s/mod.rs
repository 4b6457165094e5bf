pub mod client;
pub mod namespace;
pub mod provisioner;
pub mod translate;

/// Label keys stamped onto every object KECS materializes, mirroring the
/// `rise.dev/*` convention the teacher uses for its own managed objects.
pub const LABEL_MANAGED_BY: &str = "kecs.dev/managed-by";
pub const LABEL_CLUSTER: &str = "kecs.dev/cluster";
pub const LABEL_SERVICE: &str = "kecs.dev/service";
pub const LABEL_TASK_DEFINITION_FAMILY: &str = "kecs.dev/task-definition-family";
pub const LABEL_TASK_ARN_HASH: &str = "kecs.dev/task-id";

/// Carries the full task ARN, which doesn't fit Kubernetes' label value
/// length limit, alongside the `LABEL_TASK_ARN_HASH` label (spec.md §4.2).
pub const ANNOTATION_TASK_ARN: &str = "ecs.amazonaws.com/task-arn";

/// Stamped on a Deployment/Pod whose task definition carries a `taskRoleArn`
/// (spec.md §4.2 "IAM task role becomes an annotation and a ServiceAccount").
pub const ANNOTATION_TASK_ROLE_ARN: &str = "ecs.amazonaws.com/task-role-arn";

/// IRSA's own annotation key, stamped on the ServiceAccount a task role
/// translates to so the convention matches what a real EKS cluster expects.
pub const ANNOTATION_IAM_ROLE_ARN: &str = "eks.amazonaws.com/role-arn";

/// `awsvpc` subnets/security groups, carried as annotations since Kubernetes
/// has no native concept of an ECS ENI (spec.md §4.2 "awsvpc" network mode).
pub const ANNOTATION_SUBNETS: &str = "ecs.amazonaws.com/subnets";
pub const ANNOTATION_SECURITY_GROUPS: &str = "ecs.amazonaws.com/security-groups";

pub const MANAGED_BY_VALUE: &str = "kecs";

pub const FIELD_MANAGER: &str = "kecs";
