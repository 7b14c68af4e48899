//! Runs the bootstrap sequence over a remote session

use tracing::{debug, info, warn};

use remotecluster_common::Error;

use crate::executor::RemoteSession;
use crate::steps::{build_steps, ProvisioningStep};
use crate::version::KubernetesVersion;

/// Provision a single-node cluster at `version` over `session`
///
/// Parses the version, builds the step list and runs it. Returns
/// [`Error::InvalidVersion`] before touching the host if the version is
/// malformed, otherwise the result of [`run_steps`].
pub async fn run(session: &dyn RemoteSession, version: &str) -> Result<(), Error> {
    let version = KubernetesVersion::parse(version)?;
    let steps = build_steps(&version);
    info!(
        version = %version,
        repo_version = %version.repo_version(),
        steps = steps.len(),
        "starting bootstrap sequence"
    );
    run_steps(session, &steps).await
}

/// Execute `steps` strictly in order, stopping at the first failure
///
/// A step fails when the transport cannot run it or when it exits with
/// anything but zero. The returned [`Error::StepExecution`] carries the
/// failing command and its combined output; for transport failures the
/// output is the transport's error text. Later steps are never dispatched.
pub async fn run_steps(
    session: &dyn RemoteSession,
    steps: &[ProvisioningStep],
) -> Result<(), Error> {
    let total = steps.len();
    for (index, step) in steps.iter().enumerate() {
        debug!(
            step = index + 1,
            total,
            stage = ?step.stage,
            command = %step.command,
            "executing step"
        );

        let result = match session.execute(&step.command).await {
            Ok(result) => result,
            Err(e) => {
                warn!(command = %step.command, error = %e, "transport failed to run step");
                return Err(Error::step_execution(&step.command, e.to_string()));
            }
        };

        if !result.success() {
            warn!(
                command = %step.command,
                exit_status = ?result.exit_status,
                "step failed"
            );
            return Err(Error::step_execution(&step.command, result.output));
        }
    }

    info!(total, "bootstrap sequence complete");
    Ok(())
}
