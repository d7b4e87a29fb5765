use std::collections::BTreeSet;

use futures::stream::{self, StreamExt};
use mde_client::{ActionRequest, MachineActionApi};

use crate::action::{LiveResponseJob, RemoteAction};
use crate::availability::AvailabilityGate;
use crate::config::MachineActionConfig;
use crate::error::{ResponseError, Result};
use crate::evidence::{Evidence, Machine};
use crate::report::{ContainmentReport, LiveResponseOutcome};
use crate::tracker::JobTracker;
use crate::types::{ContainmentKind, JobStatus};

/// Per-machine driver: wait for availability, submit, track, move on.
///
/// Within one machine everything is sequential. Distinct machines are
/// independent and [`acquire_evidence_files`](Self::acquire_evidence_files)
/// runs them on a bounded pool.
pub struct ActionSequencer<'a, C: ?Sized> {
    client: &'a C,
    config: &'a MachineActionConfig,
}

impl<'a, C: MachineActionApi + ?Sized> ActionSequencer<'a, C> {
    pub fn new(client: &'a C, config: &'a MachineActionConfig) -> Self {
        Self { client, config }
    }

    pub fn gate(&self) -> AvailabilityGate<'a, C> {
        AvailabilityGate::new(self.client, &self.config.statuses)
    }

    pub fn tracker(&self) -> JobTracker<'a, C> {
        JobTracker::new(self.client, self.config)
    }

    // -----------------------------------------------------------------------
    // Generic single action
    // -----------------------------------------------------------------------

    /// Block until the gate reports `machine_id` available, spending from
    /// `polls`. Fails once `polls` reaches the availability budget.
    pub async fn await_availability(&self, machine_id: &str, polls: &mut u32) -> Result<()> {
        let budget = self.config.availability_budget();
        while *polls < budget {
            if self.gate().is_available(machine_id).await {
                return Ok(());
            }
            tokio::time::sleep(self.config.poll_interval()).await;
            *polls += 1;
        }
        tracing::error!(
            machine_id,
            timeout_secs = self.config.machine_timeout_secs,
            "machine was not available within timeout"
        );
        Err(ResponseError::MachineUnavailableTimeout {
            machine_id: machine_id.to_string(),
            timeout_secs: self.config.machine_timeout_secs,
        })
    }

    /// One submission attempt, no availability check.
    pub async fn submit(&self, machine_id: &str, request: ActionRequest) -> Result<RemoteAction> {
        let kind = request.kind();
        match self.client.submit_action(machine_id, &request).await {
            Ok(record) => {
                tracing::info!(machine_id, action_id = %record.id, %kind, "machine action submitted");
                Ok(RemoteAction::submitted(machine_id, request, &record))
            }
            Err(e) => {
                if !self.config.statuses.is_busy_rejection(&e) {
                    tracing::error!(machine_id, %kind, error = %e, "machine action submission failed");
                }
                Err(e.into())
            }
        }
    }

    /// Wait for availability and submit. A submission the vendor rejects
    /// because the machine is busy counts as one unavailable check and goes
    /// back to waiting. Any other rejection is returned as is.
    pub async fn submit_when_available(
        &self,
        machine_id: &str,
        request: ActionRequest,
        polls: &mut u32,
    ) -> Result<RemoteAction> {
        loop {
            self.await_availability(machine_id, polls).await?;
            match self.submit(machine_id, request.clone()).await {
                Err(ResponseError::Remote(e)) if self.config.statuses.is_busy_rejection(&e) => {
                    tracing::warn!(
                        machine_id,
                        error = %e,
                        "machine took another action before submission, waiting"
                    );
                    tokio::time::sleep(self.config.poll_interval()).await;
                    *polls += 1;
                }
                other => return other,
            }
        }
    }

    /// Availability, submit, then track to a terminal state. A rejected
    /// submission is returned as an error and never polled.
    pub async fn run_action(&self, machine_id: &str, request: ActionRequest) -> Result<RemoteAction> {
        let mut polls = 0;
        let mut action = self
            .submit_when_available(machine_id, request, &mut polls)
            .await?;
        self.tracker().wait(&mut action).await;
        Ok(action)
    }

    // -----------------------------------------------------------------------
    // Live-response acquisition
    // -----------------------------------------------------------------------

    /// Acquire one evidence file from `machine_id`, drawing on the machine's
    /// shared availability counter. Only an exhausted availability budget is
    /// returned as an error; every other failure becomes the outcome.
    pub async fn acquire_evidence(
        &self,
        machine_id: &str,
        evidence: &mut Evidence,
        polls: &mut u32,
    ) -> Result<LiveResponseOutcome> {
        let request = ActionRequest::LiveResponse {
            path: evidence.absolute_path.clone(),
            comment: format!("{} {}", self.config.live_response_comment, evidence.sha256),
        };
        tracing::info!(
            machine_id,
            sha256 = %evidence.sha256,
            path = %evidence.absolute_path,
            "starting live response job"
        );
        let outcome = match self.submit_when_available(machine_id, request, polls).await {
            Ok(action) => {
                let mut job = LiveResponseJob::new(action);
                let outcome = self.track_live_response(&mut job).await;
                evidence.live_response = Some(job);
                outcome
            }
            Err(e @ ResponseError::MachineUnavailableTimeout { .. }) => return Err(e),
            Err(e) => LiveResponseOutcome::Failed {
                error: e.to_string(),
            },
        };
        evidence.record(outcome.clone());
        Ok(outcome)
    }

    async fn track_live_response(&self, job: &mut LiveResponseJob) -> LiveResponseOutcome {
        // The submit response carries an empty command list; the GetFile
        // index only shows up on a later read.
        tokio::time::sleep(self.config.settle_delay()).await;
        match self.client.get_action(&job.action.id).await {
            Ok(record) => {
                job.enrich(&record);
            }
            Err(e) => {
                job.action.fail(format!("could not read live response job: {e}"));
            }
        }

        if !job.action.is_terminal() {
            self.tracker().wait(&mut job.action).await;
        }

        match (job.action.status, job.command_index) {
            (JobStatus::Succeeded, Some(index)) => {
                match self
                    .client
                    .live_response_download_link(&job.action.id, index)
                    .await
                {
                    Ok(url) => {
                        job.download_url = Some(url.clone());
                        LiveResponseOutcome::Acquired { download_url: url }
                    }
                    Err(e) => {
                        tracing::error!(
                            action_id = %job.action.id,
                            error = %e,
                            "failed to retrieve live response result"
                        );
                        LiveResponseOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            (JobStatus::TimedOut, _) => LiveResponseOutcome::TimedOut {
                action_id: job.action.id.clone(),
            },
            _ => LiveResponseOutcome::Failed {
                error: job
                    .action
                    .failure()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("live response ended {}", job.action.status)),
            },
        }
    }

    /// Work through one machine's queue in order. Stops early, leaving the
    /// rest marked skipped, once the machine's availability budget is spent.
    pub async fn acquire_machine(&self, mut machine: Machine) -> Machine {
        tracing::info!(
            machine_id = %machine.id,
            evidences = machine.pending.len(),
            "starting live response acquisition"
        );
        while let Some(mut evidence) = machine.pending.pop_front() {
            match self
                .acquire_evidence(&machine.id, &mut evidence, &mut machine.availability_polls)
                .await
            {
                Ok(_) => machine.processed.push(evidence),
                Err(e) => {
                    machine.pending.push_front(evidence);
                    tracing::error!(
                        machine_id = %machine.id,
                        skipped = machine.pending.len(),
                        error = %e,
                        "skipping remaining evidence"
                    );
                    for skipped in machine.pending.iter_mut() {
                        skipped.record(LiveResponseOutcome::Skipped);
                    }
                    machine.exhausted = true;
                    break;
                }
            }
        }
        machine
    }

    /// Run every machine's queue, at most `max_parallel_machines` at once.
    /// Returns the machines sorted by id.
    pub async fn acquire_evidence_files(&self, machines: Vec<Machine>) -> Vec<Machine> {
        let limit = self.config.max_parallel_machines.max(1);
        let mut done: Vec<Machine> = stream::iter(machines)
            .map(|machine| self.acquire_machine(machine))
            .buffer_unordered(limit)
            .collect()
            .await;
        done.sort_by(|a, b| a.id.cmp(&b.id));
        done
    }

    // -----------------------------------------------------------------------
    // Containment
    // -----------------------------------------------------------------------

    /// Run one containment action on each machine in turn, each with its own
    /// availability budget. A submitted action that did not time out is
    /// followed by a cooldown; the timeout path already waited after its
    /// cancel.
    pub async fn run_containment(
        &self,
        kind: ContainmentKind,
        request: &ActionRequest,
        machines: &BTreeSet<String>,
    ) -> Vec<ContainmentReport> {
        let mut reports = Vec::with_capacity(machines.len());
        for machine_id in machines {
            tracing::info!(machine_id = %machine_id, %kind, "starting containment action");
            let report = match self.run_action(machine_id, request.clone()).await {
                Ok(action) => {
                    if action.status != JobStatus::TimedOut {
                        tokio::time::sleep(self.config.poll_interval()).await;
                    }
                    ContainmentReport {
                        kind,
                        machine_id: machine_id.clone(),
                        action_id: Some(action.id.clone()),
                        status: Some(action.status),
                        error: action.failure().map(|e| e.to_string()),
                    }
                }
                Err(e) => ContainmentReport {
                    kind,
                    machine_id: machine_id.clone(),
                    action_id: None,
                    status: None,
                    error: Some(e.to_string()),
                },
            };
            reports.push(report);
        }
        reports
    }
}
