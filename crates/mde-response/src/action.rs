use mde_client::{ActionRecord, ActionRequest};
use serde::{Deserialize, Serialize};

use crate::error::ResponseError;
use crate::types::JobStatus;

/// One submitted machine action and its local lifecycle state.
///
/// A `RemoteAction` only exists once the vendor has assigned an id; a
/// request that never got past the availability gate or the submit call is
/// reported as an error instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAction {
    pub machine_id: String,
    pub request: ActionRequest,
    pub id: String,
    pub status: JobStatus,
    /// Polls that observed the action still running.
    pub polls: u32,
    pub error: Option<String>,
    /// Set when the tracker issued the timeout cancellation.
    pub cancel_requested: bool,
}

impl RemoteAction {
    pub fn submitted(machine_id: &str, request: ActionRequest, record: &ActionRecord) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            request,
            id: record.id.clone(),
            status: JobStatus::Submitted,
            polls: 0,
            error: None,
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next` if the lifecycle allows it. Returns whether the
    /// transition happened; terminal actions never change.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if self.status == next && next == JobStatus::InProgress {
            return true;
        }
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                action_id = %self.id,
                from = %self.status,
                to = %next,
                "rejected machine action transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Mark the action failed with `error`.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.transition(JobStatus::Failed) {
            self.error = Some(error.into());
        }
    }

    /// The error this action ended with, if it did not succeed.
    pub fn failure(&self) -> Option<ResponseError> {
        match self.status {
            JobStatus::Failed => Some(ResponseError::JobFailed {
                action_id: self.id.clone(),
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "unspecified error".to_string()),
            }),
            JobStatus::TimedOut => Some(ResponseError::JobPollTimeout {
                action_id: self.id.clone(),
                polls: self.polls,
            }),
            _ => None,
        }
    }
}

/// Live-response `GetFile` job. The command index is learned by a second
/// read of the action after submission; the download URL once it finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveResponseJob {
    pub action: RemoteAction,
    pub command_index: Option<u32>,
    pub download_url: Option<String>,
}

impl LiveResponseJob {
    pub fn new(action: RemoteAction) -> Self {
        Self {
            action,
            command_index: None,
            download_url: None,
        }
    }

    /// Record the `GetFile` position from a fresh read of the action.
    /// Fails the job when the record carries no such command.
    pub fn enrich(&mut self, record: &ActionRecord) -> Option<u32> {
        self.command_index = record.get_file_index();
        if self.command_index.is_none() {
            self.action
                .fail(ResponseError::MissingCommandIndex(self.action.id.clone()).to_string());
        }
        self.command_index
    }
}
