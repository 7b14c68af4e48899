use std::time::Duration;

use clap::Args;
use kube::runtime::controller::Config as ControllerRuntimeConfig;

use remotecluster_common::DEFAULT_FAILURE_REQUEUE_SECS;
use remotecluster_provision::SshConfig;

/// Controller tunables, each settable by flag or environment variable
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Seconds before a Failed RemoteCluster is reconciled again
    #[arg(long, env = "RC_FAILURE_REQUEUE_SECS", default_value_t = DEFAULT_FAILURE_REQUEUE_SECS)]
    pub failure_requeue_secs: u64,

    /// Seconds allowed for SSH connect and authentication
    #[arg(long, env = "RC_CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    pub connect_timeout_secs: u64,

    /// Maximum clusters reconciled at once (0 = unbounded)
    #[arg(long, env = "RC_CONCURRENCY", default_value_t = 0)]
    pub concurrency: u16,

    /// Only watch RemoteClusters in this namespace (default: all namespaces)
    #[arg(long, env = "RC_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Do not install the CRD on startup
    #[arg(long, env = "RC_SKIP_CRD_INSTALL")]
    pub skip_crd_install: bool,
}

impl ControllerConfig {
    /// Delay before retrying a Failed cluster
    pub fn failure_requeue(&self) -> Duration {
        Duration::from_secs(self.failure_requeue_secs)
    }

    /// SSH transport settings
    pub fn ssh(&self) -> SshConfig {
        SshConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// kube-rs controller runtime settings
    pub fn runtime(&self) -> ControllerRuntimeConfig {
        ControllerRuntimeConfig::default().concurrency(self.concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ControllerConfig,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "test",
            "--failure-requeue-secs",
            "15",
            "--connect-timeout-secs",
            "5",
            "--concurrency",
            "4",
            "--watch-namespace",
            "infra",
            "--skip-crd-install",
        ])
        .unwrap();

        assert_eq!(cli.config.failure_requeue(), Duration::from_secs(15));
        assert_eq!(cli.config.ssh().connect_timeout, Duration::from_secs(5));
        assert_eq!(cli.config.concurrency, 4);
        assert_eq!(cli.config.watch_namespace.as_deref(), Some("infra"));
        assert!(cli.config.skip_crd_install);
    }

    #[test]
    fn non_numeric_delay_is_rejected() {
        assert!(TestCli::try_parse_from(["test", "--failure-requeue-secs", "soon"]).is_err());
    }
}
