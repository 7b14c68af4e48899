//! Startup utilities for the RemoteCluster operator

mod crds;

pub use crds::{crd_yaml, ensure_crds_installed};
