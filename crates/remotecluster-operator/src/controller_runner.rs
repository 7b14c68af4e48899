//! Controller runner - builds the RemoteCluster controller future

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use remotecluster_common::crd::RemoteCluster;
use remotecluster_common::FIELD_MANAGER;
use remotecluster_controller::{error_policy, reconcile, Context};

use crate::config::ControllerConfig;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the RemoteCluster controller future
///
/// Runs until SIGTERM/SIGINT.
pub fn build_cluster_controller(
    client: Client,
    config: &ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::from_client(client.clone(), config.ssh(), FIELD_MANAGER)
            .failure_requeue(config.failure_requeue())
            .build(),
    );

    let clusters: Api<RemoteCluster> = match &config.watch_namespace {
        Some(namespace) => {
            tracing::info!(namespace = %namespace, "- RemoteCluster controller (namespaced)");
            Api::namespaced(client, namespace)
        }
        None => {
            tracing::info!("- RemoteCluster controller");
            Api::all(client)
        }
    };

    Box::pin(
        Controller::new(
            clusters,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .with_config(config.runtime())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("RemoteCluster")),
    )
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
