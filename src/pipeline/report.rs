use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::ImageReference;

use super::types::ProbeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Pass,
    Fail,
}

/// Outcome of one smoke probe, recorded whether it passed or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub kind: ProbeKind,
    pub pod: String,
    pub url: String,
    pub status: ProbeStatus,
    /// Response body on success; empty when the probe failed.
    pub body: String,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn from_result(kind: ProbeKind, pod: String, url: String, result: Result<String>) -> Self {
        match result {
            Ok(body) => Self {
                kind,
                pod,
                url,
                status: ProbeStatus::Pass,
                body,
                error: None,
            },
            Err(e) => Self {
                kind,
                pod,
                url,
                status: ProbeStatus::Fail,
                body: String::new(),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ProbeStatus::Pass
    }

    fn section_text(&self) -> String {
        match &self.error {
            None => self.body.clone(),
            Some(err) => format!("FAILED: {err}"),
        }
    }
}

/// Final report of a full-stack deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub run_id: String,
    pub cluster: String,
    pub images: Vec<ImageReference>,
    /// `kubectl get pods -o wide` output.
    pub workloads: String,
    pub data_service: ProbeReport,
    pub frontend: ProbeReport,
    pub cross_service: ProbeReport,
}

impl DeployReport {
    pub fn probes(&self) -> [&ProbeReport; 3] {
        [&self.data_service, &self.frontend, &self.cross_service]
    }

    pub fn all_passed(&self) -> bool {
        self.probes().iter().all(|p| p.passed())
    }

    /// The proxied body equals the direct one, i.e. the front-end reaches
    /// the same backend.
    pub fn cross_matches_data(&self) -> bool {
        self.data_service.passed()
            && self.cross_service.passed()
            && self.data_service.body.trim() == self.cross_service.body.trim()
    }

    /// Human-readable report: workloads, then the three probe bodies.
    pub fn render(&self) -> String {
        format!(
            "--- Pods ---\n{}\n\n\
             --- Backend /api response ---\n{}\n\n\
             --- Frontend HTML ---\n{}\n\n\
             --- End-to-end proxy fetch ---\n{}",
            self.workloads.trim_end(),
            self.data_service.section_text(),
            self.frontend.section_text(),
            self.cross_service.section_text(),
        )
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialise report: {e}")))
    }
}
