//! Deployment rollout waits.

use std::time::Duration;

use crate::cluster::ClusterSession;
use crate::error::{Error, Result};
use crate::exec::{ExecResult, Runner};

/// Extra time the executor allows past kubectl's own deadline before it
/// kills the call.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Block until `deployment/<workload>` reports a complete rollout, or fail
/// with [`Error::Timeout`] once `timeout` elapses.
///
/// kubectl enforces the bound itself; the executor kills the call at
/// `timeout + KILL_GRACE` in case kubectl hangs.
pub fn wait_for_rollout(
    runner: &Runner,
    engine: &str,
    session: &ClusterSession,
    workload: &str,
    timeout: Duration,
) -> Result<ExecResult> {
    session.ensure_started()?;

    let deployment = format!("deployment/{workload}");
    let deadline = format!("--timeout={}s", timeout.as_secs().max(1));
    let cmd = session.kubectl(
        engine,
        &["rollout", "status", deployment.as_str(), deadline.as_str()],
        timeout + KILL_GRACE,
    );

    tracing::info!(workload = %workload, timeout_secs = timeout.as_secs(), "waiting for rollout");
    let result = runner.run(cmd)?;
    if result.success {
        return Ok(result);
    }

    let output = result.combined_output();
    if result.timed_out || is_deadline_message(&output) {
        return Err(Error::Timeout {
            workload: workload.to_string(),
            timeout,
            output,
        });
    }
    Err(Error::Command {
        command: format!("kubectl rollout status {deployment}"),
        code: result.exit_code,
        output,
    })
}

fn is_deadline_message(output: &str) -> bool {
    output.contains("timed out waiting") || output.contains("exceeded its progress deadline")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterConfig, Provisioner};
    use crate::config::{ClusterSettings, Timeouts};
    use crate::exec::ScriptedExecutor;

    fn session(exec: &ScriptedExecutor) -> ClusterSession {
        let runner = Runner::new(exec);
        let state = tempfile::tempdir().unwrap();
        let p = Provisioner::new(&runner, "docker", "run", state.path(), Timeouts::default());
        let pending = p.bootstrap("test-run-1", ClusterConfig::default()).unwrap();
        p.start(pending, &ClusterSettings::default()).unwrap()
    }

    #[test]
    fn ready_workload_returns_status_text() {
        let exec = ScriptedExecutor::new().on(
            &["rollout status deployment/backend-app"],
            ExecResult::ok("deployment \"backend-app\" successfully rolled out\n"),
        );
        let s = session(&exec);
        let result = wait_for_rollout(
            &Runner::new(&exec),
            "docker",
            &s,
            "backend-app",
            Duration::from_secs(120),
        )
        .unwrap();
        assert!(result.stdout.contains("successfully rolled out"));
        assert_eq!(exec.count("--timeout=120s"), 1);
    }

    #[test]
    fn kubectl_deadline_is_a_timeout() {
        let exec = ScriptedExecutor::new().on(
            &["rollout status"],
            ExecResult::failed(1, "error: timed out waiting for the condition"),
        );
        let s = session(&exec);
        let err = wait_for_rollout(
            &Runner::new(&exec),
            "docker",
            &s,
            "frontend-app",
            Duration::from_secs(120),
        )
        .unwrap_err();
        match err {
            Error::Timeout {
                workload, timeout, ..
            } => {
                assert_eq!(workload, "frontend-app");
                assert_eq!(timeout, Duration::from_secs(120));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn killed_call_is_a_timeout() {
        let exec = ScriptedExecutor::new().on(
            &["rollout status"],
            ExecResult::killed_after_timeout("Waiting for deployment rollout to finish"),
        );
        let s = session(&exec);
        let err = wait_for_rollout(&Runner::new(&exec), "docker", &s, "x", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn other_failures_are_command_errors() {
        let exec = ScriptedExecutor::new().on(
            &["rollout status"],
            ExecResult::failed(1, "Error from server (NotFound): deployments.apps \"x\" not found"),
        );
        let s = session(&exec);
        let err = wait_for_rollout(&Runner::new(&exec), "docker", &s, "x", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }
}
