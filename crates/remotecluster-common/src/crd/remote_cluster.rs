//! RemoteCluster Custom Resource Definition
//!
//! A RemoteCluster describes a single Linux host reachable over SSH that the
//! operator turns into a single-node kubeadm cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ClusterPhase, Condition, SecretKeyRef};
use crate::DEFAULT_SSH_PORT;

/// Specification for a RemoteCluster
///
/// Example:
/// ```yaml
/// apiVersion: remotecluster.dev/v1alpha1
/// kind: RemoteCluster
/// metadata:
///   name: edge-1
///   namespace: infra
/// spec:
///   host: 10.0.0.5
///   port: 22
///   user: ubuntu
///   auth:
///     passwordSecretRef:
///       name: edge-1-ssh
///       key: password
///   kubernetes:
///     version: v1.30.2
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "remotecluster.dev",
    version = "v1alpha1",
    kind = "RemoteCluster",
    plural = "remoteclusters",
    shortname = "rc",
    status = "RemoteClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"K8s","type":"string","jsonPath":".spec.kubernetes.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RemoteClusterSpec {
    /// Hostname or IP address of the target machine
    pub host: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// SSH login user. Must be able to run `sudo` without a password prompt.
    pub user: String,

    /// How to authenticate to the host
    pub auth: AuthSpec,

    /// Kubernetes installation settings
    pub kubernetes: KubernetesSpec,

    /// Expected SHA-256 fingerprint of the host's SSH key.
    ///
    /// Accepts the bare base64 digest or the `SHA256:` prefixed form printed by
    /// `ssh-keygen -lf`. When unset, any host key is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// SSH authentication settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Secret key holding the SSH password, resolved in the RemoteCluster's namespace
    pub password_secret_ref: SecretKeyRef,
}

/// Kubernetes installation settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSpec {
    /// Kubernetes version, `major.minor` or `major.minor.patch` with an optional `v`
    pub version: String,
}

impl RemoteClusterSpec {
    /// `host:port` as dialed by the transport
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the fields the reconciler needs before touching the host
    ///
    /// The Kubernetes version is checked by the provisioning crate, which
    /// owns its grammar.
    pub fn validate(&self, cluster: &str) -> Result<(), crate::Error> {
        if self.host.trim().is_empty() {
            return Err(crate::Error::validation_for_field(
                cluster,
                "spec.host",
                "host cannot be empty",
            ));
        }
        if self.port == 0 {
            return Err(crate::Error::validation_for_field(
                cluster,
                "spec.port",
                "port must be between 1 and 65535",
            ));
        }
        if self.user.trim().is_empty() {
            return Err(crate::Error::validation_for_field(
                cluster,
                "spec.user",
                "user cannot be empty",
            ));
        }
        let secret_ref = &self.auth.password_secret_ref;
        if secret_ref.name.is_empty() {
            return Err(crate::Error::validation_for_field(
                cluster,
                "spec.auth.passwordSecretRef.name",
                "secret name cannot be empty",
            ));
        }
        if secret_ref.key.is_empty() {
            return Err(crate::Error::validation_for_field(
                cluster,
                "spec.auth.passwordSecretRef.key",
                "secret key cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Status for a RemoteCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteClusterStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Human-readable message. Authoritative only when the phase is Failed.
    ///
    /// Serialized as `null` when unset so a merge patch clears the text left
    /// by an earlier attempt.
    #[serde(default)]
    pub message: Option<String>,

    /// Conditions describing the last transition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// The `metadata.generation` the controller last acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl RemoteClusterStatus {
    /// Create a status with only the phase set
    pub fn with_phase(phase: ClusterPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Append a condition
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

impl RemoteCluster {
    /// Current phase, treating a missing status as Pending
    pub fn phase(&self) -> ClusterPhase {
        self.status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(ClusterPhase::Pending)
    }
}
