use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the deploy pipeline and its stages.
#[derive(Debug, Error)]
pub enum Error {
    /// A session-dependent operation ran before a cluster was provisioned,
    /// or the orchestrator already failed.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Image build or publish failure.
    #[error("image {image}: {detail}")]
    Build { image: String, detail: String },

    /// Registry or cluster bootstrap/start failure.
    #[error("cluster provisioning failed: {0}")]
    Provision(String),

    /// `kubectl apply` exited non-zero.
    #[error("manifest apply failed (exit {}): {output}", fmt_code(.code))]
    Apply { code: Option<i32>, output: String },

    /// A workload did not roll out within its bound.
    #[error("workload {workload} not ready within {}s: {output}", .timeout.as_secs())]
    Timeout {
        workload: String,
        timeout: Duration,
        output: String,
    },

    /// A smoke probe exited non-zero or returned an unexpected body.
    #[error("probe {probe} failed: {failure}")]
    Probe { probe: String, failure: ProbeFailure },

    /// A pass-through command exited non-zero.
    #[error("command `{command}` failed (exit {}): {output}", fmt_code(.code))]
    Command {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The executor could not start a process.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a probe was reported as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The probe pod exited non-zero (non-2xx responses land here too).
    Exit { code: Option<i32>, output: String },
    /// The probe succeeded but its body lacked the expected text.
    Expectation { expected: String, body: String },
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Exit { code, output } => {
                write!(f, "exit {}: {}", fmt_code(code), output.trim())
            }
            ProbeFailure::Expectation { expected, body } => {
                write!(f, "expected body to contain {expected:?}, got {:?}", body.trim())
            }
        }
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

pub type Result<T> = std::result::Result<T, Error>;
