//! Custom Resource Definitions for the RemoteCluster operator

mod remote_cluster;
mod types;

pub use remote_cluster::{
    AuthSpec, KubernetesSpec, RemoteCluster, RemoteClusterSpec, RemoteClusterStatus,
};
pub use types::{ClusterPhase, Condition, ConditionStatus, SecretKeyRef};
