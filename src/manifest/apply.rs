use std::time::Duration;

use crate::cluster::ClusterSession;
use crate::error::{Error, Result};
use crate::exec::Runner;

use super::ManifestSet;
use super::outcome::{ApplySummary, parse_apply_log};

/// Apply `set` as one batch against a started session.
///
/// The set's directory must have been mounted into the server when the
/// cluster was bootstrapped. Re-applying an unchanged set yields a summary
/// whose [`ApplySummary::changed`] is false; that comes from kubectl's own
/// reconciliation. A non-zero exit is reported verbatim and not retried.
pub fn apply(
    runner: &Runner,
    engine: &str,
    session: &ClusterSession,
    set: &ManifestSet,
    timeout: Duration,
) -> Result<ApplySummary> {
    session.ensure_started()?;
    let mount = session.mount_for(set.dir()).ok_or_else(|| {
        Error::Precondition(format!(
            "manifest directory {} is not mounted into cluster {}",
            set.dir().display(),
            session.id()
        ))
    })?;

    tracing::info!(
        cluster = %session.id(),
        files = set.files().len(),
        mount = %mount.container,
        "applying manifests"
    );
    let cmd = session.kubectl(engine, &["apply", "-f", mount.container.as_str()], timeout);
    let result = runner.run(cmd)?;
    if !result.success {
        return Err(Error::Apply {
            code: result.exit_code,
            output: result.combined_output(),
        });
    }

    let summary = parse_apply_log(&result.stdout);
    tracing::info!(
        resources = summary.resources.len(),
        changed = summary.changed(),
        "manifests applied"
    );
    Ok(summary)
}
