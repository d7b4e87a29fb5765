use serde::{Deserialize, Serialize};

use crate::types::{ContainmentKind, JobStatus, Verdict};

/// What happened to one evidence's live-response acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LiveResponseOutcome {
    Acquired { download_url: String },
    Failed { error: String },
    TimedOut { action_id: String },
    /// Never submitted: the machine's availability budget ran out first.
    Skipped,
}

impl LiveResponseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LiveResponseOutcome::Acquired { .. } => "acquired",
            LiveResponseOutcome::Failed { .. } => "failed",
            LiveResponseOutcome::TimedOut { .. } => "timed_out",
            LiveResponseOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceOutcome {
    pub sha256: String,
    pub absolute_path: String,
    #[serde(flatten)]
    pub outcome: LiveResponseOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineReport {
    pub machine_id: String,
    pub outcomes: Vec<EvidenceOutcome>,
    /// The machine stayed busy past its availability budget.
    pub exhausted: bool,
}

impl MachineReport {
    pub fn acquired(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, LiveResponseOutcome::Acquired { .. }))
            .count()
    }
}

/// One containment action against one machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainmentReport {
    pub kind: ContainmentKind,
    pub machine_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainmentReport {
    pub fn succeeded(&self) -> bool {
        self.status == Some(JobStatus::Succeeded)
    }
}

/// One alert comment update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertUpdate {
    pub alert_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlertUpdate {
    pub fn updated(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationReport {
    pub verdict: Verdict,
    pub sha256: String,
    pub entries: Vec<ContainmentReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<AlertUpdate>,
}

impl RemediationReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| !e.succeeded()).count()
    }
}
