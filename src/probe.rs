//! One-shot smoke probes run as pods inside the cluster.

use std::time::Duration;

use crate::cluster::ClusterSession;
use crate::error::{Error, ProbeFailure, Result};
use crate::exec::Runner;

/// Kubernetes object names are DNS-1123 labels.
const MAX_NAME_LEN: usize = 63;

/// `curl` invocation that exits non-zero on connection errors and non-2xx
/// responses, and prints only the body on success.
pub fn curl_command(url: &str) -> Vec<String> {
    vec![
        "curl".to_string(),
        "-sS".to_string(),
        "-f".to_string(),
        url.to_string(),
    ]
}

/// Run `command` in a short-lived pod named `probe_name` and return its
/// standard output.
///
/// The pod is created with `--rm` so it is removed when it finishes. After a
/// failure the runner also deletes it explicitly, since `--rm` does not
/// clean up a pod that never attached.
pub fn run_probe(
    runner: &Runner,
    engine: &str,
    session: &ClusterSession,
    probe_name: &str,
    image: &str,
    command: &[String],
    timeout: Duration,
) -> Result<String> {
    session.ensure_started()?;
    validate_name(probe_name)?;
    if command.is_empty() {
        return Err(Error::Precondition(format!("probe {probe_name} has no command")));
    }

    let image_arg = format!("--image={image}");
    let pod_timeout = format!("--pod-running-timeout={}s", timeout.as_secs().max(1));
    let mut argv: Vec<String> = [
        "kubectl",
        "run",
        probe_name,
        "--rm",
        "-i",
        "--quiet",
        "--restart=Never",
        image_arg.as_str(),
        pod_timeout.as_str(),
        "--",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    argv.extend(command.iter().cloned());

    tracing::info!(probe = %probe_name, image = %image, "running probe");
    let result = runner.run(session.exec(engine, &argv, timeout))?;

    if !result.success {
        remove_leftover(runner, engine, session, probe_name, timeout);
        return Err(Error::Probe {
            probe: probe_name.to_string(),
            failure: ProbeFailure::Exit {
                code: result.exit_code,
                output: strip_deletion_notice(&result.combined_output(), probe_name),
            },
        });
    }

    Ok(strip_deletion_notice(&result.stdout, probe_name))
}

/// Fail with [`ProbeFailure::Expectation`] if `expect` is set and missing
/// from `body`.
pub fn check_expectation(probe_name: &str, body: &str, expect: Option<&str>) -> Result<()> {
    match expect {
        Some(needle) if !body.contains(needle) => Err(Error::Probe {
            probe: probe_name.to_string(),
            failure: ProbeFailure::Expectation {
                expected: needle.to_string(),
                body: body.to_string(),
            },
        }),
        _ => Ok(()),
    }
}

fn remove_leftover(
    runner: &Runner,
    engine: &str,
    session: &ClusterSession,
    probe_name: &str,
    timeout: Duration,
) {
    let cmd = session.kubectl(
        engine,
        &[
            "delete",
            "pod",
            probe_name,
            "--ignore-not-found",
            "--wait=false",
        ],
        timeout,
    );
    match runner.run(cmd) {
        Ok(r) if r.success => {}
        Ok(r) => tracing::warn!(probe = %probe_name, output = %r.combined_output(), "probe pod cleanup failed"),
        Err(e) => tracing::warn!(probe = %probe_name, error = %e, "probe pod cleanup failed"),
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(Error::Precondition(format!(
            "probe name {name:?} is not a valid pod name"
        )))
    }
}

/// kubectl prints `pod "<name>" deleted` on the attached stream once `--rm`
/// removes the pod; that line is not part of the probe's output.
fn strip_deletion_notice(output: &str, probe_name: &str) -> String {
    let notice = format!("pod \"{probe_name}\" deleted");
    output
        .lines()
        .filter(|l| l.trim() != notice)
        .collect::<Vec<_>>()
        .join("\n")
}
