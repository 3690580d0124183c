use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::exec::{ExecCommand, Runner};

use super::RUN_LABEL;

/// What [`teardown`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownSummary {
    pub containers: usize,
    pub networks: usize,
}

/// Remove every container and network labelled with `run_id`.
///
/// Failed runs are never cleaned up automatically; this is the explicit
/// way to reclaim their registry, server and network.
pub fn teardown(
    runner: &Runner,
    engine: &str,
    run_id: &str,
    timeout: Duration,
) -> Result<TeardownSummary> {
    let filter = format!("label={RUN_LABEL}={run_id}");

    let containers = list(runner, engine, &["ps", "-aq", "--filter", filter.as_str()], timeout)?;
    if !containers.is_empty() {
        let mut args = vec!["rm".to_string(), "-f".to_string()];
        args.extend(containers.iter().cloned());
        checked(runner, ExecCommand::new(engine, args, timeout))?;
    }

    let networks = list(
        runner,
        engine,
        &["network", "ls", "-q", "--filter", filter.as_str()],
        timeout,
    )?;
    if !networks.is_empty() {
        let mut args = vec!["network".to_string(), "rm".to_string()];
        args.extend(networks.iter().cloned());
        checked(runner, ExecCommand::new(engine, args, timeout))?;
    }

    tracing::info!(
        run = %run_id,
        containers = containers.len(),
        networks = networks.len(),
        "teardown complete"
    );
    Ok(TeardownSummary {
        containers: containers.len(),
        networks: networks.len(),
    })
}

fn list(runner: &Runner, engine: &str, args: &[&str], timeout: Duration) -> Result<Vec<String>> {
    let cmd = ExecCommand::new(engine, args.iter().map(|a| a.to_string()).collect(), timeout);
    let out = checked(runner, cmd)?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn checked(runner: &Runner, cmd: ExecCommand) -> Result<String> {
    let command = cmd.display();
    let result = runner.run(cmd)?;
    if result.success {
        Ok(result.stdout)
    } else {
        Err(Error::Command {
            command,
            code: result.exit_code,
            output: result.combined_output(),
        })
    }
}
