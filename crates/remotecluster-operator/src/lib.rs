//! RemoteCluster operator: CLI configuration, CRD installation and the
//! controller runner wired into the `remotecluster-operator` binary.

#![deny(missing_docs)]

/// Command-line and environment configuration
pub mod config;
/// Builds the RemoteCluster controller future
pub mod controller_runner;
/// Startup utilities (CRD install)
pub mod startup;
