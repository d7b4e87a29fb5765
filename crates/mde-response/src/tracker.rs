use mde_client::{ActionRecord, MachineActionApi};

use crate::action::RemoteAction;
use crate::config::MachineActionConfig;
use crate::types::JobStatus;

/// Drives one submitted action to a terminal state by polling.
///
/// At most `poll_budget()` polls observe the action running. Once the budget
/// is spent the action is marked timed out and cancelled exactly once; the
/// cancellation result does not change the local state.
pub struct JobTracker<'a, C: ?Sized> {
    client: &'a C,
    config: &'a MachineActionConfig,
}

impl<'a, C: MachineActionApi + ?Sized> JobTracker<'a, C> {
    pub fn new(client: &'a C, config: &'a MachineActionConfig) -> Self {
        Self { client, config }
    }

    /// Fetch the action once and apply its vendor status.
    pub async fn poll(&self, action: &mut RemoteAction) -> JobStatus {
        if action.is_terminal() {
            return action.status;
        }
        match self.client.get_action(&action.id).await {
            Ok(record) => self.apply(action, &record),
            Err(e) => {
                tracing::error!(
                    action_id = %action.id,
                    machine_id = %action.machine_id,
                    error = %e,
                    "failed to read machine action status"
                );
                action.fail(format!("status poll failed: {e}"));
            }
        }
        action.status
    }

    fn apply(&self, action: &mut RemoteAction, record: &ActionRecord) {
        let statuses = &self.config.statuses;
        if statuses.is_succeeded(&record.status) {
            action.transition(JobStatus::Succeeded);
            tracing::info!(
                action_id = %action.id,
                machine_id = %action.machine_id,
                "machine action finished"
            );
        } else if statuses.is_failed(&record.status) {
            let error = record
                .first_error()
                .map(str::to_string)
                .unwrap_or_else(|| format!("vendor status {}", record.status));
            tracing::error!(
                action_id = %action.id,
                machine_id = %action.machine_id,
                status = %record.status,
                error = %error,
                "machine action failed"
            );
            action.fail(error);
        } else {
            action.polls += 1;
            action.transition(JobStatus::InProgress);
            tracing::debug!(
                action_id = %action.id,
                status = %record.status,
                polls = action.polls,
                "machine action still running"
            );
        }
    }

    /// Sleep one poll interval, poll, repeat until the action is terminal or
    /// the poll budget is spent.
    pub async fn wait(&self, action: &mut RemoteAction) -> JobStatus {
        let budget = self.config.poll_budget();
        tracing::info!(
            action_id = %action.id,
            machine_id = %action.machine_id,
            budget,
            "waiting for machine action"
        );
        while !action.is_terminal() && action.polls < budget {
            tokio::time::sleep(self.config.poll_interval()).await;
            self.poll(action).await;
        }
        if !action.is_terminal() {
            self.time_out(action).await;
        }
        action.status
    }

    async fn time_out(&self, action: &mut RemoteAction) {
        action.transition(JobStatus::TimedOut);
        tracing::error!(
            action_id = %action.id,
            machine_id = %action.machine_id,
            timeout_secs = self.config.job_timeout_secs,
            "machine action timeout was hit"
        );
        action.cancel_requested = true;
        if !self.client.cancel_action(&action.id).await {
            tracing::warn!(action_id = %action.id, "timed-out action may still be running");
        }
        // give the vendor time to stop the cancelled action
        tokio::time::sleep(self.config.poll_interval()).await;
    }
}
