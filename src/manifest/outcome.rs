use std::fmt;

use serde::Serialize;

/// What `kubectl apply` reported for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyAction {
    Created,
    Configured,
    Unchanged,
    Other,
}

impl ApplyAction {
    fn from_word(word: &str) -> Self {
        match word {
            "created" => Self::Created,
            "configured" => Self::Configured,
            "unchanged" => Self::Unchanged,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Configured => f.write_str("configured"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::Other => f.write_str("other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResource {
    /// `kind.group/name`, as printed by kubectl.
    pub resource: String,
    pub action: ApplyAction,
}

/// Parsed result of one manifest apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub resources: Vec<AppliedResource>,
    pub raw: String,
}

impl ApplySummary {
    pub fn count(&self, action: ApplyAction) -> usize {
        self.resources.iter().filter(|r| r.action == action).count()
    }

    /// True unless every reported resource was `unchanged`.
    pub fn changed(&self) -> bool {
        self.resources
            .iter()
            .any(|r| r.action != ApplyAction::Unchanged)
    }
}

/// Parse `kubectl apply` output.
///
/// Expects one resource per line:
/// ```text
/// deployment.apps/backend-app created
/// service/backend-service unchanged
/// configmap/nginx-conf configured (server dry run)
/// ```
/// Lines without a `kind/name` token (warnings, blank lines) are skipped.
pub fn parse_apply_log(raw: &str) -> ApplySummary {
    let resources = raw.lines().filter_map(parse_line).collect();
    ApplySummary {
        resources,
        raw: raw.to_string(),
    }
}

fn parse_line(line: &str) -> Option<AppliedResource> {
    let mut tokens = line.split_whitespace();
    let resource = tokens.next()?;
    if !resource.contains('/') || resource.starts_with("Warning") {
        return None;
    }
    let action = ApplyAction::from_word(tokens.next()?);
    Some(AppliedResource {
        resource: resource.to_string(),
        action,
    })
}
