//! Error types for the RemoteCluster operator
//!
//! Errors are structured with fields so the reconciler can render a precise
//! status message. Every variant renders to the human-readable text that ends
//! up in `status.message` when a cluster enters the Failed phase.

use thiserror::Error;

/// Main error type for RemoteCluster operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a RemoteCluster spec
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.host")
        field: Option<String>,
    },

    /// Kubernetes version string could not be parsed
    #[error("invalid kubernetes version: {version}")]
    InvalidVersion {
        /// The version string exactly as written on the resource
        version: String,
    },

    /// The SSH credential could not be resolved from its Secret
    #[error("credential resolution error for secret {secret}: {message}")]
    CredentialResolution {
        /// Name of the referenced Secret
        secret: String,
        /// Description of what failed
        message: String,
    },

    /// The transport could not establish a session with the host
    #[error("connection error to {target}: {message}")]
    Connection {
        /// `host:port` that was dialed
        target: String,
        /// Description of what failed
        message: String,
    },

    /// A provisioning step failed on the remote host
    #[error("command failed: {command}\nOutput:\n{output}")]
    StepExecution {
        /// The exact command that failed
        command: String,
        /// Combined stdout/stderr of the command, verbatim
        output: String,
    },
}

impl Error {
    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid-version error for the given (un-normalized) version string
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create a credential resolution error for the given Secret
    pub fn credential(secret: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CredentialResolution {
            secret: secret.into(),
            message: msg.into(),
        }
    }

    /// Create a connection error for the given `host:port` target
    pub fn connection(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a step execution error carrying the failing command and its output
    pub fn step_execution(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::StepExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Short label for metrics, one per variant
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kubernetes",
            Error::Validation { .. } => "validation",
            Error::InvalidVersion { .. } => "invalid_version",
            Error::CredentialResolution { .. } => "credentials",
            Error::Connection { .. } => "connection",
            Error::StepExecution { .. } => "step_execution",
        }
    }

    /// Get the failing command for step execution errors
    pub fn failed_command(&self) -> Option<&str> {
        match self {
            Error::StepExecution { command, .. } => Some(command),
            _ => None,
        }
    }
}
