//! SSH transport built on `russh`
//!
//! One [`SshSession`] is opened per reconciliation attempt and each command
//! gets its own exec channel. stdout and stderr are merged in the order the
//! server sends them so failure output reads the way it would on a terminal.
//! Only the last [`MAX_CAPTURED_OUTPUT`] bytes are kept, since that is where
//! `apt-get` and `kubeadm` print their errors.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tracing::{debug, info, warn};

use remotecluster_common::Error;

use crate::executor::{CommandOutput, ConnectTarget, RemoteConnector, RemoteSession};

/// Default time allowed for TCP connect, key exchange and authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the output kept per command
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

/// Connection settings shared by every session
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// Bound on connect plus authentication
    pub connect_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Opens password-authenticated SSH sessions
#[derive(Clone, Debug, Default)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    /// Create a connector with the given settings
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    async fn open(&self, target: &ConnectTarget, password: &str) -> Result<SshSession, Error> {
        let address = target.address();
        let handler = HostKeyCheck {
            address: address.clone(),
            expected: target.host_key_fingerprint.clone(),
        };
        let config = Arc::new(client::Config::default());

        let mut handle = client::connect(config, (target.host.as_str(), target.port), handler)
            .await
            .map_err(|e| Error::connection(&address, e.to_string()))?;

        let authenticated = handle
            .authenticate_password(&target.user, password)
            .await
            .map_err(|e| Error::connection(&address, e.to_string()))?;
        if !authenticated {
            return Err(Error::connection(
                &address,
                format!("password authentication rejected for user {}", target.user),
            ));
        }

        Ok(SshSession { handle, address })
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
        password: &str,
    ) -> Result<Box<dyn RemoteSession>, Error> {
        let address = target.address();
        debug!(address = %address, user = %target.user, "opening ssh session");

        let session = tokio::time::timeout(self.config.connect_timeout, self.open(target, password))
            .await
            .map_err(|_| {
                Error::connection(
                    &address,
                    format!("timed out after {}s", self.config.connect_timeout.as_secs()),
                )
            })??;

        info!(address = %address, "ssh session established");
        Ok(Box::new(session))
    }
}

/// Live SSH connection
pub struct SshSession {
    handle: Handle<HostKeyCheck>,
    address: String,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn execute(&self, command: &str) -> Result<CommandOutput, Error> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::connection(&self.address, format!("open channel: {e}")))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::connection(&self.address, format!("exec: {e}")))?;

        let mut output = OutputTail::new(MAX_CAPTURED_OUTPUT);
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.push(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.push(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        if output.dropped > 0 {
            debug!(address = %self.address, dropped = output.dropped, "command output truncated");
        }
        Ok(CommandOutput {
            output: output.into_string(),
            exit_status,
        })
    }

    async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!(address = %self.address, error = %e, "ssh disconnect failed");
        }
    }
}

/// Keeps the last `limit` bytes of a command's merged output
struct OutputTail {
    buf: VecDeque<u8>,
    limit: usize,
    dropped: usize,
}

impl OutputTail {
    fn new(limit: usize) -> Self {
        Self {
            buf: VecDeque::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, data: &[u8]) {
        let data = match data.len().checked_sub(self.limit) {
            Some(skip) if skip > 0 => {
                self.dropped += skip + self.buf.len();
                self.buf.clear();
                &data[skip..]
            }
            _ => data,
        };

        let overflow = (self.buf.len() + data.len()).saturating_sub(self.limit);
        self.buf.drain(..overflow);
        self.dropped += overflow;
        self.buf.extend(data);
    }

    /// Render as text, prefixed with a marker when the head was cut off
    fn into_string(self) -> String {
        let bytes: Vec<u8> = self.buf.into();
        let text = String::from_utf8_lossy(&bytes);
        if self.dropped == 0 {
            text.into_owned()
        } else {
            format!("[{} earlier bytes omitted]\n{}", self.dropped, text)
        }
    }
}

/// Host key verification
///
/// With no pinned fingerprint every key is accepted and its fingerprint is
/// logged so it can be copied into `spec.hostKeyFingerprint`.
struct HostKeyCheck {
    address: String,
    expected: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        let actual = key.fingerprint();
        match &self.expected {
            Some(expected) if !fingerprint_matches(expected, &actual) => {
                warn!(
                    address = %self.address,
                    expected = %expected,
                    actual = %actual,
                    "host key fingerprint mismatch"
                );
                Ok(false)
            }
            Some(_) => Ok(true),
            None => {
                debug!(address = %self.address, fingerprint = %actual, "accepting unpinned host key");
                Ok(true)
            }
        }
    }
}

/// Compare a configured fingerprint against the base64 SHA-256 digest
/// `russh-keys` reports. The `SHA256:` prefix printed by `ssh-keygen -l` is
/// optional, as is base64 padding.
fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    let expected = expected.strip_prefix("SHA256:").unwrap_or(expected);
    expected.trim_end_matches('=') == actual.trim_end_matches('=')
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "nThbg6kXUpJWGl7E1IGOCspRomTxdCARLviKw6E5SY8";

    #[test]
    fn fingerprint_accepts_ssh_keygen_form() {
        assert!(fingerprint_matches(&format!("SHA256:{DIGEST}"), DIGEST));
        assert!(fingerprint_matches(DIGEST, DIGEST));
        assert!(fingerprint_matches(&format!("  {DIGEST}= "), DIGEST));
    }

    #[test]
    fn fingerprint_mismatch_is_rejected() {
        assert!(!fingerprint_matches("SHA256:AAAA", DIGEST));
        assert!(!fingerprint_matches("", DIGEST));
    }

    #[test]
    fn short_output_is_kept_whole() {
        let mut tail = OutputTail::new(16);
        tail.push(b"E: ");
        tail.push(b"lock held");
        assert_eq!(tail.dropped, 0);
        assert_eq!(tail.into_string(), "E: lock held");
    }

    #[test]
    fn long_output_keeps_the_last_bytes_in_order() {
        let mut tail = OutputTail::new(8);
        tail.push(b"Reading package lists...");
        tail.push(b"\nE: fail");
        assert_eq!(tail.dropped, 24);
        assert_eq!(tail.into_string(), "[24 earlier bytes omitted]\nE: fail");
    }

    #[test]
    fn many_small_chunks_stay_within_limit() {
        let mut tail = OutputTail::new(4);
        for chunk in [b"ab".as_slice(), b"cd", b"ef", b"g"] {
            tail.push(chunk);
        }
        assert_eq!(tail.buf.len(), 4);
        assert_eq!(tail.dropped, 3);
        assert_eq!(tail.into_string(), "[3 earlier bytes omitted]\ndefg");
    }

    #[test]
    fn default_capture_limit_is_64_kib() {
        let mut tail = OutputTail::new(MAX_CAPTURED_OUTPUT);
        tail.push(&vec![b'x'; MAX_CAPTURED_OUTPUT + 10]);
        assert_eq!(tail.buf.len(), MAX_CAPTURED_OUTPUT);
        assert_eq!(tail.dropped, 10);
    }

    #[test]
    fn default_connect_timeout_is_thirty_seconds() {
        assert_eq!(SshConfig::default().connect_timeout, Duration::from_secs(30));
    }
}
