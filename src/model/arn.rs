use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of resource an ARN refers to, mirroring the ECS path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Cluster,
    Service,
    Task,
    TaskDefinition,
}

impl ResourceKind {
    fn path_segment(self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Service => "service",
            ResourceKind::Task => "task",
            ResourceKind::TaskDefinition => "task-definition",
        }
    }
}

/// `arn:aws:ecs:{region}:{account}:{cluster|task|task-definition|service}/{name}[:{revision}]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arn(String);

impl Arn {
    pub fn cluster(region: &str, account_id: &str, cluster_name: &str) -> Self {
        Self::build(region, account_id, ResourceKind::Cluster, cluster_name, None)
    }

    pub fn service(region: &str, account_id: &str, cluster_name: &str, service_name: &str) -> Self {
        Self::build(
            region,
            account_id,
            ResourceKind::Service,
            &format!("{cluster_name}/{service_name}"),
            None,
        )
    }

    pub fn task(region: &str, account_id: &str, cluster_name: &str, task_id: &str) -> Self {
        Self::build(
            region,
            account_id,
            ResourceKind::Task,
            &format!("{cluster_name}/{task_id}"),
            None,
        )
    }

    pub fn task_definition(region: &str, account_id: &str, family: &str, revision: i32) -> Self {
        Self::build(
            region,
            account_id,
            ResourceKind::TaskDefinition,
            family,
            Some(revision),
        )
    }

    fn build(
        region: &str,
        account_id: &str,
        kind: ResourceKind,
        name: &str,
        revision: Option<i32>,
    ) -> Self {
        let mut s = format!(
            "arn:aws:ecs:{region}:{account_id}:{}/{name}",
            kind.path_segment()
        );
        if let Some(rev) = revision {
            s.push(':');
            s.push_str(&rev.to_string());
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the trailing `{family}:{revision}` form used by `RegisterTaskDefinition`
    /// callers that pass `family:revision` instead of a full ARN.
    pub fn parse_family_revision(input: &str) -> Option<(&str, i32)> {
        let (family, rev) = input.rsplit_once(':')?;
        let revision: i32 = rev.parse().ok()?;
        Some((family, revision))
    }

    /// True if `input` looks like a full ARN rather than a bare name.
    pub fn looks_like_arn(input: &str) -> bool {
        input.starts_with("arn:aws:ecs:")
    }

    /// Extract the resource kind and path from a well-formed ARN string.
    pub fn parse(input: &str) -> Option<(ResourceKind, &str)> {
        let rest = input.strip_prefix("arn:aws:ecs:")?;
        // rest = "{region}:{account}:{kind}/{path}"
        let mut parts = rest.splitn(3, ':');
        let _region = parts.next()?;
        let _account = parts.next()?;
        let kind_and_path = parts.next()?;
        let (kind_str, path) = kind_and_path.split_once('/')?;
        let kind = match kind_str {
            "cluster" => ResourceKind::Cluster,
            "service" => ResourceKind::Service,
            "task" => ResourceKind::Task,
            "task-definition" => ResourceKind::TaskDefinition,
            _ => return None,
        };
        Some((kind, path))
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Arn {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Arn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_arn_has_expected_shape() {
        let arn = Arn::cluster("us-east-1", "000000000000", "default");
        assert_eq!(arn.as_str(), "arn:aws:ecs:us-east-1:000000000000:cluster/default");
    }

    #[test]
    fn task_definition_arn_carries_revision() {
        let arn = Arn::task_definition("us-east-1", "000000000000", "web", 3);
        assert_eq!(
            arn.as_str(),
            "arn:aws:ecs:us-east-1:000000000000:task-definition/web:3"
        );
    }

    #[test]
    fn parse_family_revision_splits_on_last_colon() {
        assert_eq!(Arn::parse_family_revision("web:3"), Some(("web", 3)));
        assert_eq!(Arn::parse_family_revision("web"), None);
    }

    #[test]
    fn parse_recovers_kind_and_path() {
        let arn = Arn::service("us-east-1", "000000000000", "default", "s");
        let (kind, path) = Arn::parse(arn.as_str()).unwrap();
        assert_eq!(kind, ResourceKind::Service);
        assert_eq!(path, "default/s");
    }
}
