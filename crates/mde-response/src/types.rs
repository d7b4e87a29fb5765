use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ResponseError;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Sandbox classification of an evidence sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Suspicious,
    Malicious,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Clean => "clean",
            Verdict::Suspicious => "suspicious",
            Verdict::Malicious => "malicious",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verdict {
    type Err = ResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clean" => Ok(Verdict::Clean),
            "suspicious" => Ok(Verdict::Suspicious),
            "malicious" => Ok(Verdict::Malicious),
            _ => Err(ResponseError::InvalidVerdict(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ContainmentKind
// ---------------------------------------------------------------------------

/// Single-shot containment actions the planner can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentKind {
    InvestigationPackage,
    AntivirusScan,
    Quarantine,
    Isolation,
}

impl ContainmentKind {
    /// Evaluation order. Package collection runs first so evidence is
    /// preserved before anything contains or removes it.
    pub fn priority_order() -> &'static [ContainmentKind] {
        &[
            ContainmentKind::InvestigationPackage,
            ContainmentKind::AntivirusScan,
            ContainmentKind::Quarantine,
            ContainmentKind::Isolation,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainmentKind::InvestigationPackage => "investigation_package",
            ContainmentKind::AntivirusScan => "antivirus_scan",
            ContainmentKind::Quarantine => "quarantine",
            ContainmentKind::Isolation => "isolation",
        }
    }

    pub fn default_comment(self) -> &'static str {
        match self {
            ContainmentKind::InvestigationPackage => {
                "Investigation package collected by mde-response"
            }
            ContainmentKind::AntivirusScan => "Antivirus scan started by mde-response",
            ContainmentKind::Quarantine => "File stopped and quarantined by mde-response",
            ContainmentKind::Isolation => "Machine isolated by mde-response",
        }
    }

    /// Vendor type code vocabulary, for kinds that take one.
    pub fn type_codes(self) -> &'static [&'static str] {
        match self {
            ContainmentKind::AntivirusScan => &["Quick", "Full"],
            ContainmentKind::Isolation => &["Full", "Selective"],
            ContainmentKind::InvestigationPackage | ContainmentKind::Quarantine => &[],
        }
    }

    pub fn default_type_code(self) -> Option<&'static str> {
        self.type_codes().first().copied()
    }
}

impl fmt::Display for ContainmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Local lifecycle state of a submitted machine action.
///
/// Transitions: `Submitted → InProgress → Succeeded | Failed`, with
/// `TimedOut` reachable from either non-terminal state. Terminal states
/// never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Submitted, JobStatus::InProgress) => true,
            (JobStatus::Submitted | JobStatus::InProgress, next) => matches!(
                next,
                JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
            ),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::InProgress => "in_progress",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parse_is_case_insensitive() {
        assert_eq!("Malicious".parse::<Verdict>().unwrap(), Verdict::Malicious);
        assert_eq!("clean".parse::<Verdict>().unwrap(), Verdict::Clean);
        assert!("unknown".parse::<Verdict>().is_err());
    }

    #[test]
    fn priority_order_starts_with_package_and_ends_with_isolation() {
        let order = ContainmentKind::priority_order();
        assert_eq!(order.first(), Some(&ContainmentKind::InvestigationPackage));
        assert_eq!(order.last(), Some(&ContainmentKind::Isolation));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn terminal_states_never_transition() {
        let all = [
            JobStatus::Submitted,
            JobStatus::InProgress,
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::TimedOut,
            JobStatus::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn timeout_reachable_from_any_non_terminal_state() {
        assert!(JobStatus::Submitted.can_transition_to(JobStatus::TimedOut));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::TimedOut));
        assert!(!JobStatus::InProgress.can_transition_to(JobStatus::Submitted));
        assert!(!JobStatus::Submitted.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
