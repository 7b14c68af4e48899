//! Remote provisioning for RemoteCluster
//!
//! Turns a Kubernetes version into the ordered list of shell commands that
//! bootstrap a single-node kubeadm cluster, and runs that list over a remote
//! session, stopping at the first failure.
//!
//! - [`version`] - version parsing and package-repository mapping
//! - [`steps`] - the pure step builder
//! - [`sequencer`] - runs steps through a [`RemoteSession`]
//! - [`executor`] - transport traits consumed by the sequencer
//! - [`ssh`] - `russh`-backed transport

#![deny(missing_docs)]

pub mod executor;
pub mod sequencer;
pub mod ssh;
pub mod steps;
pub mod version;

pub use executor::{CommandOutput, ConnectTarget, RemoteConnector, RemoteSession};
pub use sequencer::{run, run_steps};
pub use ssh::{SshConfig, SshConnector};
pub use steps::{build_steps, ProvisioningStage, ProvisioningStep};
pub use version::KubernetesVersion;
