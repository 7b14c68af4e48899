//! Kubernetes Event recording for the RemoteCluster controller.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "ProvisioningStarted")
    /// * `action` - What action was taken (e.g. "Provision")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as the given controller name.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Bootstrap sequence started against the host
    pub const PROVISIONING_STARTED: &str = "ProvisioningStarted";
    /// Control plane initialized and pod network applied
    pub const CLUSTER_READY: &str = "ClusterReady";
    /// Cluster entered Failed phase
    pub const CLUSTER_FAILED: &str = "ClusterFailed";
}

/// Well-known event action strings.
pub mod actions {
    /// Running the bootstrap sequence
    pub const PROVISION: &str = "Provision";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn reason_constants_are_pascal_case() {
        assert_eq!(reasons::PROVISIONING_STARTED, "ProvisioningStarted");
        assert_eq!(reasons::CLUSTER_READY, "ClusterReady");
        assert_eq!(reasons::CLUSTER_FAILED, "ClusterFailed");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::CLUSTER_FAILED,
                actions::PROVISION,
                Some("command failed".to_string()),
            )
            .await;
    }
}
