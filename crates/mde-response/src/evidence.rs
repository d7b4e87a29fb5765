use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::LiveResponseJob;
use crate::report::{EvidenceOutcome, LiveResponseOutcome, MachineReport};

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// A file observed in one or more alerts, keyed by its sha256.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub sha256: String,
    pub sha1: Option<String>,
    pub file_name: String,
    /// Path on the source machine, as passed to `GetFile`.
    pub absolute_path: String,
    /// Machine of the alert that first reported this file.
    pub machine_id: String,
    /// Severity of the first alert that reported this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub alerts: BTreeSet<String>,
    pub machines: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_response: Option<LiveResponseJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<LiveResponseOutcome>,
}

impl Evidence {
    pub fn new(
        sha256: impl Into<String>,
        sha1: Option<String>,
        file_name: impl Into<String>,
        file_path: &str,
        machine_id: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let machine_id = machine_id.into();
        Self {
            sha256: sha256.into(),
            sha1,
            absolute_path: join_path(file_path, &file_name),
            file_name,
            machines: BTreeSet::from([machine_id.clone()]),
            machine_id,
            severity: None,
            alerts: BTreeSet::new(),
            live_response: None,
            download_url: None,
            download_path: None,
            acquisition: None,
        }
    }

    /// Record one more sighting of this file.
    pub fn observe(&mut self, alert_id: &str, machine_id: &str) {
        self.alerts.insert(alert_id.to_string());
        self.machines.insert(machine_id.to_string());
    }

    pub fn record(&mut self, outcome: LiveResponseOutcome) {
        if let LiveResponseOutcome::Acquired { download_url } = &outcome {
            self.download_url = Some(download_url.clone());
        }
        self.acquisition = Some(outcome);
    }
}

/// Windows-style join of the alert's directory and file name. Some alerts
/// already carry the full path in `filePath`.
fn join_path(file_path: &str, file_name: &str) -> String {
    if file_path.is_empty() {
        return file_name.to_string();
    }
    let lower = file_path.to_ascii_lowercase();
    if !file_name.is_empty() && lower.ends_with(&file_name.to_ascii_lowercase()) {
        return file_path.to_string();
    }
    format!("{}\\{}", file_path.trim_end_matches('\\'), file_name)
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// One endpoint and the evidence still to acquire from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub pending: VecDeque<Evidence>,
    pub processed: Vec<Evidence>,
    /// Availability checks that found the machine busy, across the whole queue.
    pub availability_polls: u32,
    pub exhausted: bool,
}

impl Machine {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pending: VecDeque::new(),
            processed: Vec::new(),
            availability_polls: 0,
            exhausted: false,
        }
    }

    pub fn enqueue(&mut self, evidence: Evidence) {
        self.pending.push_back(evidence);
    }

    /// Evidence that resolved a download URL.
    pub fn acquired(&self) -> impl Iterator<Item = &Evidence> {
        self.processed.iter().filter(|e| e.download_url.is_some())
    }

    pub fn report(&self) -> MachineReport {
        let outcomes = self
            .processed
            .iter()
            .chain(self.pending.iter())
            .map(|e| EvidenceOutcome {
                sha256: e.sha256.clone(),
                absolute_path: e.absolute_path.clone(),
                outcome: e
                    .acquisition
                    .clone()
                    .unwrap_or(LiveResponseOutcome::Skipped),
            })
            .collect();
        MachineReport {
            machine_id: self.id.clone(),
            outcomes,
            exhausted: self.exhausted,
        }
    }
}
