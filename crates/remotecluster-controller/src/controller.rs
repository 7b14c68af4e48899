//! RemoteCluster controller implementation
//!
//! Lifecycle: Pending -> Provisioning -> Ready, with any failure landing in
//! Failed. Ready is terminal: once a cluster is Ready the controller never
//! touches the host again. Failed is retried after a fixed delay by
//! re-running the whole bootstrap sequence, which is safe because every step
//! tolerates being re-run. Watch events that arrive inside that delay,
//! including the ones our own status writes cause, are answered with a
//! requeue for the time remaining.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use remotecluster_common::crd::{RemoteCluster, RemoteClusterStatus};
use remotecluster_common::events::{
    actions, reasons, EventPublisher, KubeEventPublisher, NoopEventPublisher,
};
use remotecluster_common::metrics::ProvisioningTimer;
use remotecluster_common::{Error, DEFAULT_FAILURE_REQUEUE_SECS, FIELD_MANAGER};
use remotecluster_provision::{
    ConnectTarget, KubernetesVersion, RemoteConnector, SshConfig, SshConnector,
};

use crate::credentials::resolve_password;
use crate::status;

/// Trait abstracting Kubernetes client operations for RemoteCluster
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Merge-patch the status subresource of a RemoteCluster
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &RemoteClusterStatus,
    ) -> Result<(), Error>;

    /// Get a Secret by name and namespace, `None` if it does not exist
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &RemoteClusterStatus,
    ) -> Result<(), Error> {
        let api: Api<RemoteCluster> = Api::namespaced(self.client.clone(), namespace);

        let status_patch = serde_json::json!({
            "status": status
        });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Controller context shared by every reconcile
///
/// Use [`Context::builder`] to construct instances.
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Opens remote sessions to target hosts
    pub connector: Arc<dyn RemoteConnector>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Delay before a Failed cluster is reconciled again
    pub failure_requeue: Duration,
}

impl Context {
    /// Create a builder from the two seams every context needs
    pub fn builder(kube: Arc<dyn KubeClient>, connector: Arc<dyn RemoteConnector>) -> ContextBuilder {
        ContextBuilder::new(kube, connector)
    }

    /// Production context: real API client, SSH transport and Event recorder
    pub fn from_client(client: Client, ssh: SshConfig, controller_name: &str) -> ContextBuilder {
        Self::builder(
            Arc::new(KubeClientImpl::new(client.clone())),
            Arc::new(SshConnector::new(ssh)),
        )
        .events(Arc::new(KubeEventPublisher::new(client, controller_name)))
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```text
/// let ctx = Context::from_client(client, SshConfig::default(), "remotecluster-controller")
///     .failure_requeue(Duration::from_secs(30))
///     .build();
/// ```
pub struct ContextBuilder {
    kube: Arc<dyn KubeClient>,
    connector: Arc<dyn RemoteConnector>,
    events: Option<Arc<dyn EventPublisher>>,
    failure_requeue: Duration,
}

impl ContextBuilder {
    fn new(kube: Arc<dyn KubeClient>, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            kube,
            connector,
            events: None,
            failure_requeue: Duration::from_secs(DEFAULT_FAILURE_REQUEUE_SECS),
        }
    }

    /// Set the Event publisher. Events are dropped when unset.
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the delay before a Failed cluster is retried
    pub fn failure_requeue(mut self, delay: Duration) -> Self {
        self.failure_requeue = delay;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self.kube,
            connector: self.connector,
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventPublisher)),
            failure_requeue: self.failure_requeue,
        }
    }
}

/// Result of one reconciliation attempt
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileOutcome {
    /// Status the cluster should now have
    pub status: RemoteClusterStatus,
    /// When to reconcile again; `None` waits for the next spec change
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    /// Convert into the action handed back to the kube runtime
    pub fn action(&self) -> Action {
        match self.requeue_after {
            Some(delay) => Action::requeue(delay),
            None => Action::await_change(),
        }
    }
}

/// Reconcile a RemoteCluster resource
///
/// Entry point for the kube-rs `Controller`. All provisioning failures are
/// handled inside [`reconcile_cluster`] and come back as a requeue; only a
/// cluster without a namespace yields an error.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<RemoteCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let outcome = reconcile_cluster(&cluster, &ctx).await?;
    Ok(outcome.action())
}

/// Run one reconciliation attempt for `cluster`
///
/// Status is written when the attempt starts (Provisioning) and when it ends
/// (Ready or Failed). Neither write can change the outcome.
pub async fn reconcile_cluster(
    cluster: &RemoteCluster,
    ctx: &Context,
) -> Result<ReconcileOutcome, Error> {
    let name = cluster.name_any();
    let phase = cluster.phase();

    if phase.is_terminal() {
        debug!(cluster = %name, "cluster is Ready, nothing to do");
        return Ok(ReconcileOutcome {
            status: cluster.status.clone().unwrap_or_default(),
            requeue_after: None,
        });
    }

    if let Some(remaining) = status::retry_backoff(cluster, ctx.failure_requeue, Utc::now()) {
        debug!(
            cluster = %name,
            remaining_secs = remaining.as_secs(),
            "cluster failed recently, waiting before retrying"
        );
        return Ok(ReconcileOutcome {
            status: cluster.status.clone().unwrap_or_default(),
            requeue_after: Some(remaining),
        });
    }

    let Some(namespace) = cluster.namespace() else {
        return Err(Error::validation_for_field(
            &name,
            "metadata.namespace",
            "RemoteCluster must be namespaced",
        ));
    };
    let generation = cluster.meta().generation;
    let object_ref = cluster.object_ref(&());

    info!(
        cluster = %name,
        from = %phase,
        address = %cluster.spec.target(),
        version = %cluster.spec.kubernetes.version,
        "starting provisioning attempt"
    );
    status::persist(ctx.kube.as_ref(), cluster, &status::provisioning()).await;
    ctx.events
        .publish(
            &object_ref,
            EventType::Normal,
            reasons::PROVISIONING_STARTED,
            actions::PROVISION,
            Some(format!(
                "Provisioning Kubernetes {} on {}",
                cluster.spec.kubernetes.version,
                cluster.spec.target()
            )),
        )
        .await;

    let timer = ProvisioningTimer::start();
    match provision(cluster, &name, &namespace, ctx).await {
        Ok(()) => {
            timer.success();
            info!(cluster = %name, "cluster provisioned");
            let ready = status::ready(generation);
            status::persist(ctx.kube.as_ref(), cluster, &ready).await;
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Normal,
                    reasons::CLUSTER_READY,
                    actions::PROVISION,
                    Some(status::READY_MESSAGE.to_string()),
                )
                .await;
            Ok(ReconcileOutcome {
                status: ready,
                requeue_after: None,
            })
        }
        Err(e) => {
            timer.failure(&e);
            let message = e.to_string();
            warn!(
                cluster = %name,
                error = %message,
                command = e.failed_command(),
                requeue_secs = ctx.failure_requeue.as_secs(),
                "provisioning failed"
            );
            let failed = status::failed(&message, generation);
            status::persist(ctx.kube.as_ref(), cluster, &failed).await;
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Warning,
                    reasons::CLUSTER_FAILED,
                    actions::PROVISION,
                    Some(message),
                )
                .await;
            Ok(ReconcileOutcome {
                status: failed,
                requeue_after: Some(ctx.failure_requeue),
            })
        }
    }
}

/// Validate, resolve the password, connect and run the bootstrap sequence
async fn provision(
    cluster: &RemoteCluster,
    name: &str,
    namespace: &str,
    ctx: &Context,
) -> Result<(), Error> {
    let spec = &cluster.spec;
    spec.validate(name)?;
    KubernetesVersion::parse(&spec.kubernetes.version)?;

    let password =
        resolve_password(ctx.kube.as_ref(), namespace, &spec.auth.password_secret_ref).await?;

    let target = ConnectTarget::new(&spec.host, spec.port, &spec.user)
        .with_host_key_fingerprint(spec.host_key_fingerprint.clone());
    let session = ctx.connector.connect(&target, &password).await?;

    let result = remotecluster_provision::run(session.as_ref(), &spec.kubernetes.version).await;
    session.close().await;
    result
}

/// Error policy for the controller
///
/// Reached only for errors that escape [`reconcile`]. Provisioning failures
/// never do; they are already a Failed status with a requeue.
pub fn error_policy(cluster: Arc<RemoteCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        cluster = %cluster.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ctx.failure_requeue)
}
