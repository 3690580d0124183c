use std::fmt;

use serde::Serialize;

use crate::cluster::ClusterSession;

use super::report::{DeployReport, ProbeReport};

/// Where a run currently stands. Each variant names the state reached once
/// the corresponding transition succeeded; `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    ImagesPublished,
    ClusterReady,
    ManifestsApplied,
    WorkloadsReady,
    Tested,
    Done,
    Failed,
}

impl Stage {
    /// The stages a successful full run passes through, in order.
    pub const PIPELINE: [Stage; 6] = [
        Stage::ImagesPublished,
        Stage::ClusterReady,
        Stage::ManifestsApplied,
        Stage::WorkloadsReady,
        Stage::Tested,
        Stage::Done,
    ];

    /// What the transition into this stage does.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Init => "Initialise",
            Stage::ImagesPublished => "Build & publish images",
            Stage::ClusterReady => "Provision cluster",
            Stage::ManifestsApplied => "Apply manifests",
            Stage::WorkloadsReady => "Wait for workloads",
            Stage::Tested => "Smoke tests",
            Stage::Done => "Report",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three fixed smoke probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// GET the data-service API route directly.
    DataService,
    /// GET the front-end root page.
    Frontend,
    /// GET the API route through the front-end proxy.
    CrossService,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 3] = [
        ProbeKind::DataService,
        ProbeKind::Frontend,
        ProbeKind::CrossService,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProbeKind::DataService => "Data service /api",
            ProbeKind::Frontend => "Front-end root page",
            ProbeKind::CrossService => "Proxied /api via front-end",
        }
    }

    /// Prefix of the probe pod name.
    pub fn pod_prefix(self) -> &'static str {
        match self {
            ProbeKind::DataService => "test-backend",
            ProbeKind::Frontend => "test-frontend",
            ProbeKind::CrossService => "e2e-test",
        }
    }
}

/// Whether a cluster session has been established yet.
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Unprovisioned,
    Active(ClusterSession),
}

impl SessionState {
    pub fn active(&self) -> Option<&ClusterSession> {
        match self {
            SessionState::Active(session) => Some(session),
            SessionState::Unprovisioned => None,
        }
    }
}

/// Events emitted by the orchestrator while it runs.
#[derive(Debug)]
pub enum PipelineEvent {
    StageStarted(Stage),
    Log { stage: Stage, line: String },
    StageFinished { stage: Stage, success: bool },
    ProbeFinished(ProbeReport),
    Completed(DeployReport),
    Aborted(String),
}
