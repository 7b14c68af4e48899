//! Status construction and persistence
//!
//! Status writes are advisory. The reconciler's decision is made from the
//! provisioning result, never from whether the write landed, so a failed
//! write is logged and otherwise ignored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

use remotecluster_common::crd::{
    ClusterPhase, Condition, ConditionStatus, RemoteCluster, RemoteClusterStatus,
};

use crate::controller::KubeClient;

/// Condition type written on every transition
pub const READY_CONDITION: &str = "Ready";

/// Message set on a successfully provisioned cluster
pub const READY_MESSAGE: &str = "Cluster provisioned";

/// Status written when a provisioning attempt starts
///
/// Carries no message, which clears the text of a previous failure, and no
/// `observedGeneration`, which is only recorded once the attempt finishes.
pub fn provisioning() -> RemoteClusterStatus {
    RemoteClusterStatus::with_phase(ClusterPhase::Provisioning).condition(Condition::new(
        READY_CONDITION,
        ConditionStatus::False,
        "Provisioning",
        "Running bootstrap sequence",
    ))
}

/// Status written after the bootstrap sequence completes
pub fn ready(generation: Option<i64>) -> RemoteClusterStatus {
    let mut status = RemoteClusterStatus::with_phase(ClusterPhase::Ready)
        .message(READY_MESSAGE)
        .condition(Condition::new(
            READY_CONDITION,
            ConditionStatus::True,
            "Provisioned",
            READY_MESSAGE,
        ));
    status.observed_generation = generation;
    status
}

/// Status written after any failure, carrying the error text
pub fn failed(message: &str, generation: Option<i64>) -> RemoteClusterStatus {
    let mut status = RemoteClusterStatus::with_phase(ClusterPhase::Failed)
        .message(message)
        .condition(Condition::new(
            READY_CONDITION,
            ConditionStatus::False,
            "ProvisioningFailed",
            message,
        ));
    status.observed_generation = generation;
    status
}

/// Time left before a Failed cluster may be provisioned again
///
/// Our own status writes wake the controller immediately, so a Failed
/// cluster is held back until `delay` has passed since the failure was
/// recorded. A spec edit bumps `metadata.generation` past the recorded
/// `observedGeneration` and lifts the hold.
pub fn retry_backoff(
    cluster: &RemoteCluster,
    delay: Duration,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let status = cluster.status.as_ref()?;
    if status.phase != ClusterPhase::Failed
        || status.observed_generation != cluster.meta().generation
    {
        return None;
    }

    let failed_at = status.conditions.last()?.last_transition_time;
    // A timestamp ahead of our clock counts as just failed
    let elapsed = (now - failed_at).to_std().unwrap_or_default();
    delay.checked_sub(elapsed).filter(|left| !left.is_zero())
}

/// Write `status` for `cluster`, logging instead of failing on error
pub async fn persist(kube: &dyn KubeClient, cluster: &RemoteCluster, status: &RemoteClusterStatus) {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();

    match kube.patch_status(&name, &namespace, status).await {
        Ok(()) => debug!(cluster = %name, phase = %status.phase, "status updated"),
        Err(e) => warn!(
            cluster = %name,
            phase = %status.phase,
            error = %e,
            "failed to persist status, continuing"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_status_carries_fixed_message() {
        let status = ready(Some(3));
        assert_eq!(status.phase, ClusterPhase::Ready);
        assert_eq!(status.message.as_deref(), Some("Cluster provisioned"));
        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.conditions[0].status, ConditionStatus::True);
    }

    #[test]
    fn failed_status_carries_error_text() {
        let status = failed("command failed: sudo swapoff -a\nOutput:\nnope", None);
        assert_eq!(status.phase, ClusterPhase::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("command failed: sudo swapoff -a\nOutput:\nnope")
        );
        assert_eq!(status.conditions[0].reason, "ProvisioningFailed");
    }

    #[test]
    fn provisioning_status_clears_message_and_generation() {
        let status = provisioning();
        assert_eq!(status.phase, ClusterPhase::Provisioning);
        assert!(status.message.is_none());
        assert!(status.observed_generation.is_none());
        assert_eq!(status.conditions.len(), 1);
    }

    mod retry_backoff {
        use super::*;

        use chrono::TimeDelta;
        use remotecluster_common::crd::{
            AuthSpec, KubernetesSpec, RemoteClusterSpec, SecretKeyRef,
        };

        const DELAY: Duration = Duration::from_secs(60);

        fn cluster_at(generation: i64, status: Option<RemoteClusterStatus>) -> RemoteCluster {
            let mut cluster = RemoteCluster::new(
                "edge-1",
                RemoteClusterSpec {
                    host: "10.0.0.5".to_string(),
                    port: 22,
                    user: "ubuntu".to_string(),
                    auth: AuthSpec {
                        password_secret_ref: SecretKeyRef {
                            name: "edge-1-ssh".to_string(),
                            key: "password".to_string(),
                        },
                    },
                    kubernetes: KubernetesSpec {
                        version: "1.30.2".to_string(),
                    },
                    host_key_fingerprint: None,
                },
            );
            cluster.metadata.generation = Some(generation);
            cluster.status = status;
            cluster
        }

        fn failed_at(generation: i64, at: DateTime<Utc>) -> RemoteClusterStatus {
            let mut status = failed("command failed: x\nOutput:\n", Some(generation));
            status.conditions[0].last_transition_time = at;
            status
        }

        #[test]
        fn fresh_failure_waits_for_the_rest_of_the_delay() {
            let now = Utc::now();
            let cluster = cluster_at(1, Some(failed_at(1, now - TimeDelta::seconds(20))));
            assert_eq!(
                retry_backoff(&cluster, DELAY, now),
                Some(Duration::from_secs(40))
            );
        }

        #[test]
        fn elapsed_delay_allows_a_retry() {
            let now = Utc::now();
            let cluster = cluster_at(1, Some(failed_at(1, now - TimeDelta::seconds(60))));
            assert_eq!(retry_backoff(&cluster, DELAY, now), None);

            let cluster = cluster_at(1, Some(failed_at(1, now - TimeDelta::hours(1))));
            assert_eq!(retry_backoff(&cluster, DELAY, now), None);
        }

        #[test]
        fn spec_change_lifts_the_hold() {
            let now = Utc::now();
            let cluster = cluster_at(2, Some(failed_at(1, now)));
            assert_eq!(retry_backoff(&cluster, DELAY, now), None);
        }

        #[test]
        fn future_timestamp_holds_for_the_full_delay() {
            let now = Utc::now();
            let cluster = cluster_at(1, Some(failed_at(1, now + TimeDelta::seconds(5))));
            assert_eq!(retry_backoff(&cluster, DELAY, now), Some(DELAY));
        }

        #[test]
        fn only_failed_clusters_with_a_condition_are_held() {
            let now = Utc::now();
            assert_eq!(retry_backoff(&cluster_at(1, None), DELAY, now), None);

            let mut in_flight = provisioning();
            in_flight.observed_generation = Some(1);
            assert_eq!(
                retry_backoff(&cluster_at(1, Some(in_flight)), DELAY, now),
                None
            );

            let mut bare = RemoteClusterStatus::with_phase(ClusterPhase::Failed);
            bare.observed_generation = Some(1);
            assert_eq!(retry_backoff(&cluster_at(1, Some(bare)), DELAY, now), None);
        }
    }
}
