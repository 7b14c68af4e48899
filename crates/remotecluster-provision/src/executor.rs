//! Remote execution traits
//!
//! The sequencer only needs "run this command, give me its combined output
//! and whether it succeeded". These traits keep it independent of SSH so it
//! can be driven by scripted fakes in tests.

use async_trait::async_trait;
use remotecluster_common::Error;

#[cfg(test)]
use mockall::automock;

/// Where and as whom to connect
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Hostname or IP address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Expected SHA-256 host key fingerprint, if pinned
    pub host_key_fingerprint: Option<String>,
}

impl ConnectTarget {
    /// Create a target with no host key pinning
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            host_key_fingerprint: None,
        }
    }

    /// Pin the host key fingerprint
    pub fn with_host_key_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.host_key_fingerprint = fingerprint;
        self
    }

    /// `host:port` form used in logs and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Result of a command that ran to completion on the remote host
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout and stderr interleaved in arrival order
    pub output: String,
    /// Exit status reported by the remote side.
    ///
    /// `None` when the channel closed without reporting one (e.g. the command
    /// was killed by a signal).
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    /// Create an output with the given exit status
    pub fn new(output: impl Into<String>, exit_status: u32) -> Self {
        Self {
            output: output.into(),
            exit_status: Some(exit_status),
        }
    }

    /// True only for an explicit zero exit status
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// A live connection owned by one reconciliation attempt
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run one command and wait for it to finish
    ///
    /// Returns `Err` only when the transport could not run the command. A
    /// command that ran and exited non-zero is `Ok` with that exit status.
    async fn execute(&self, command: &str) -> Result<CommandOutput, Error>;

    /// Close the connection. Best-effort: failures are logged, not returned.
    async fn close(&self);
}

/// Opens [`RemoteSession`]s
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect and authenticate with a password
    async fn connect(
        &self,
        target: &ConnectTarget,
        password: &str,
    ) -> Result<Box<dyn RemoteSession>, Error>;
}
