mod orchestrator;
mod report;
mod types;

pub use orchestrator::{Orchestrator, run_full_stack};
pub use report::{DeployReport, ProbeReport, ProbeStatus};
pub use types::{PipelineEvent, ProbeKind, SessionState, Stage};
