use k8s_openapi::api::apps::v1::Deployment;

/// Running/pending counts derived from a Deployment's status subresource.
/// Pure function of `Deployment -> DeploymentObservation` (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentObservation {
    pub running_count: i32,
    pub pending_count: i32,
}

/// `None` when the Deployment has no status yet (just created, controller
/// hasn't observed it); callers should leave the service's counts at 0
/// rather than write a spurious update.
pub fn map(deployment: &Deployment) -> Option<DeploymentObservation> {
    let status = deployment.status.as_ref()?;
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    let ready = status.ready_replicas.unwrap_or(0);
    let total = status.replicas.unwrap_or(0);

    Some(DeploymentObservation {
        running_count: ready,
        pending_count: (total.max(desired) - ready).max(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};

    fn deployment(desired: i32, ready: i32, total: i32) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                replicas: Some(total),
                ready_replicas: Some(ready),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn no_status_maps_to_none() {
        assert!(map(&Deployment::default()).is_none());
    }

    #[test]
    fn pending_is_the_gap_between_desired_and_ready() {
        let observation = map(&deployment(3, 1, 3)).unwrap();
        assert_eq!(observation.running_count, 1);
        assert_eq!(observation.pending_count, 2);
    }

    #[test]
    fn fully_ready_deployment_has_no_pending() {
        let observation = map(&deployment(2, 2, 2)).unwrap();
        assert_eq!(observation.pending_count, 0);
    }
}
