//! RemoteCluster Operator - provisions single-node Kubernetes clusters over SSH

use clap::{Parser, Subcommand};
use kube::Client;

use remotecluster_common::telemetry::{init_telemetry, TelemetryConfig};
use remotecluster_operator::config::ControllerConfig;
use remotecluster_operator::controller_runner::build_cluster_controller;
use remotecluster_operator::startup::{crd_yaml, ensure_crds_installed};

/// RemoteCluster - turns SSH-reachable hosts into single-node kubeadm clusters
#[derive(Parser, Debug)]
#[command(name = "remotecluster-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: ControllerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the RemoteCluster CRD, then watches RemoteClusters and
    /// provisions each one until it is Ready.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube's rustls client needs a process-wide crypto provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        print!("{}", crd_yaml()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {}", e))?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if config.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crds_installed(&client).await?;
    }

    tracing::info!(
        failure_requeue_secs = config.failure_requeue_secs,
        connect_timeout_secs = config.connect_timeout_secs,
        concurrency = config.concurrency,
        "Starting RemoteCluster controller"
    );
    build_cluster_controller(client, &config).await;
    tracing::info!("Controller shut down");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_is_the_default_mode() {
        let cli = Cli::try_parse_from(["remotecluster-operator"]).unwrap();
        assert!(!cli.crd);
        assert!(cli.command.is_none());
        assert_eq!(cli.config.failure_requeue_secs, 60);
        assert_eq!(cli.config.connect_timeout_secs, 30);
        assert_eq!(cli.config.concurrency, 0);
    }

    #[test]
    fn controller_subcommand_accepts_global_config() {
        let cli = Cli::try_parse_from([
            "remotecluster-operator",
            "--failure-requeue-secs",
            "120",
            "controller",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Controller)));
        assert_eq!(cli.config.failure_requeue_secs, 120);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
