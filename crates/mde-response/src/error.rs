use std::path::PathBuf;

use mde_client::RemoteApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error(transparent)]
    Remote(#[from] RemoteApiError),

    #[error("machine {machine_id} was not available within {timeout_secs}s")]
    MachineUnavailableTimeout { machine_id: String, timeout_secs: u64 },

    #[error("machine action {action_id} still running after {polls} polls")]
    JobPollTimeout { action_id: String, polls: u32 },

    #[error("machine action {action_id} failed: {error}")]
    JobFailed { action_id: String, error: String },

    #[error("live response action {0} has no GetFile command")]
    MissingCommandIndex(String),

    #[error("evidence {sha256} has no {field}")]
    MissingEvidenceField { sha256: String, field: &'static str },

    #[error("invalid verdict '{0}': expected clean, suspicious or malicious")]
    InvalidVerdict(String),

    #[error("config not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("processed store error: {0}")]
    Store(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ResponseError>;
