//! Common types for the RemoteCluster operator: CRDs, errors, events, metrics and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// API group for all RemoteCluster resources
pub const API_GROUP: &str = "remotecluster.dev";

/// Field manager name used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "remotecluster-controller";

/// Default SSH port when `spec.port` is omitted
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default delay before a Failed cluster is reconciled again
pub const DEFAULT_FAILURE_REQUEUE_SECS: u64 = 60;
