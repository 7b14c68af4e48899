//! RemoteCluster reconciler
//!
//! Drives a `RemoteCluster` from Pending through Provisioning to Ready (or
//! Failed) by resolving its SSH password, connecting to the host and running
//! the bootstrap sequence from `remotecluster-provision`.

#![deny(missing_docs)]

pub mod controller;
pub mod credentials;
pub mod status;

pub use controller::{
    error_policy, reconcile, reconcile_cluster, Context, ContextBuilder, KubeClient,
    KubeClientImpl, ReconcileOutcome,
};
