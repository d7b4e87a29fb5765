use serde::{Deserialize, Serialize};

// ─── Envelopes ────────────────────────────────────────────────────────────

/// OData collection envelope: every list endpoint wraps its items in `value`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ODataList<T> {
    pub value: Vec<T>,
}

/// OData scalar envelope (`GetLiveResponseResultDownloadLink` returns one).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ODataValue<T> {
    pub value: T,
}

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorErrorBody {
    pub error: VendorError,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

// ─── Machine actions ──────────────────────────────────────────────────────

/// A vendor-tracked machine action as returned by `/machineactions`.
///
/// Only the fields the orchestration engine reads are typed; everything
/// else in the payload is ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
    pub status: String,
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub requestor_comment: Option<String>,
    #[serde(default)]
    pub creation_date_time_utc: Option<String>,
    #[serde(default)]
    pub commands: Vec<CommandRecord>,
}

impl ActionRecord {
    /// Position of the first `GetFile` command, needed to resolve the
    /// live-response download link.
    pub fn get_file_index(&self) -> Option<u32> {
        self.commands
            .iter()
            .find(|c| c.command.command_type == "GetFile")
            .map(|c| c.index)
    }

    /// First error reported by any command of this action.
    pub fn first_error(&self) -> Option<&str> {
        self.commands
            .iter()
            .flat_map(|c| c.errors.iter())
            .map(String::as_str)
            .next()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub index: u32,
    #[serde(default)]
    pub command_status: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub command: CommandSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandSpec {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub params: Vec<CommandParam>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandParam {
    pub key: String,
    pub value: String,
}

// ─── Action requests ──────────────────────────────────────────────────────

/// The vendor action families this client can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LiveResponse,
    Isolate,
    AntivirusScan,
    StopAndQuarantineFile,
    CollectInvestigationPackage,
}

impl ActionKind {
    /// Path segment under `/api/machines/{id}/`.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::LiveResponse => "runliveresponse",
            Self::Isolate => "isolate",
            Self::AntivirusScan => "runAntiVirusScan",
            Self::StopAndQuarantineFile => "StopAndQuarantineFile",
            Self::CollectInvestigationPackage => "collectInvestigationPackage",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiveResponse => "live_response",
            Self::Isolate => "isolate",
            Self::AntivirusScan => "antivirus_scan",
            Self::StopAndQuarantineFile => "stop_and_quarantine_file",
            Self::CollectInvestigationPackage => "collect_investigation_package",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A machine action to submit, with its action-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionRequest {
    /// Live-response `GetFile` for a single absolute path.
    LiveResponse { path: String, comment: String },
    Isolate {
        comment: String,
        isolation_type: String,
    },
    AntivirusScan { comment: String, scan_type: String },
    StopAndQuarantineFile { comment: String, sha1: String },
    CollectInvestigationPackage { comment: String },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::LiveResponse { .. } => ActionKind::LiveResponse,
            Self::Isolate { .. } => ActionKind::Isolate,
            Self::AntivirusScan { .. } => ActionKind::AntivirusScan,
            Self::StopAndQuarantineFile { .. } => ActionKind::StopAndQuarantineFile,
            Self::CollectInvestigationPackage { .. } => ActionKind::CollectInvestigationPackage,
        }
    }

    /// JSON body in the shape the vendor endpoint expects.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::LiveResponse { path, comment } => serde_json::json!({
                "Commands": [
                    {"type": "GetFile", "params": [{"key": "Path", "value": path}]}
                ],
                "Comment": comment,
            }),
            Self::Isolate {
                comment,
                isolation_type,
            } => serde_json::json!({"Comment": comment, "IsolationType": isolation_type}),
            Self::AntivirusScan { comment, scan_type } => {
                serde_json::json!({"Comment": comment, "ScanType": scan_type})
            }
            Self::StopAndQuarantineFile { comment, sha1 } => {
                serde_json::json!({"Comment": comment, "Sha1": sha1})
            }
            Self::CollectInvestigationPackage { comment } => {
                serde_json::json!({"Comment": comment})
            }
        }
    }
}

// ─── Alerts ───────────────────────────────────────────────────────────────

/// An alert with its evidence expanded (`$expand=evidence`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Absent for alerts not tied to a device.
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub evidence: Vec<AlertEvidence>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvidence {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}
