use mde_client::{ActionRequest, AlertApi, MachineActionApi};

use crate::annotate::{annotate_alerts, VerdictSummary};
use crate::config::MachineActionConfig;
use crate::error::{ResponseError, Result};
use crate::evidence::Evidence;
use crate::report::{ContainmentReport, RemediationReport};
use crate::sequencer::ActionSequencer;
use crate::types::{ContainmentKind, Verdict};

/// Containment kinds that fire for `verdict`, in priority order.
pub fn plan(config: &MachineActionConfig, verdict: Verdict) -> Vec<ContainmentKind> {
    ContainmentKind::priority_order()
        .iter()
        .copied()
        .filter(|&kind| config.policy(kind).triggers_on(verdict))
        .collect()
}

/// Build the vendor request for `kind`, applying the policy's comment and
/// type code overrides.
pub fn build_request(
    config: &MachineActionConfig,
    kind: ContainmentKind,
    evidence: &Evidence,
) -> Result<ActionRequest> {
    let policy = config.policy(kind);
    let comment = policy
        .comment
        .clone()
        .unwrap_or_else(|| kind.default_comment().to_string());
    let type_code = policy
        .type_code
        .clone()
        .or_else(|| kind.default_type_code().map(str::to_string))
        .unwrap_or_default();

    let request = match kind {
        ContainmentKind::InvestigationPackage => {
            ActionRequest::CollectInvestigationPackage { comment }
        }
        ContainmentKind::AntivirusScan => ActionRequest::AntivirusScan {
            comment,
            scan_type: type_code,
        },
        ContainmentKind::Quarantine => {
            let sha1 = evidence
                .sha1
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ResponseError::MissingEvidenceField {
                    sha256: evidence.sha256.clone(),
                    field: "sha1",
                })?;
            ActionRequest::StopAndQuarantineFile { comment, sha1 }
        }
        ContainmentKind::Isolation => ActionRequest::Isolate {
            comment,
            isolation_type: type_code,
        },
    };
    Ok(request)
}

/// Fires the configured containment actions for a sample verdict.
pub struct RemediationPlanner<'a, C: ?Sized> {
    client: &'a C,
    sequencer: ActionSequencer<'a, C>,
    config: &'a MachineActionConfig,
}

impl<'a, C: MachineActionApi + ?Sized> RemediationPlanner<'a, C> {
    pub fn new(client: &'a C, config: &'a MachineActionConfig) -> Self {
        Self {
            client,
            sequencer: ActionSequencer::new(client, config),
            config,
        }
    }

    /// Best effort: every failure is logged and lands in the report, and a
    /// failing kind never stops the ones after it.
    pub async fn run_automated_actions(
        &self,
        verdict: Verdict,
        evidence: &Evidence,
    ) -> RemediationReport {
        let kinds = plan(self.config, verdict);
        tracing::info!(
            sha256 = %evidence.sha256,
            %verdict,
            actions = kinds.len(),
            machines = evidence.machines.len(),
            "running automated machine actions"
        );

        let mut entries = Vec::new();
        for kind in kinds {
            match build_request(self.config, kind, evidence) {
                Ok(request) => {
                    let reports = self
                        .sequencer
                        .run_containment(kind, &request, &evidence.machines)
                        .await;
                    for report in reports.iter().filter(|r| !r.succeeded()) {
                        tracing::error!(
                            %kind,
                            machine_id = %report.machine_id,
                            error = report.error.as_deref().unwrap_or("unknown"),
                            "containment action did not succeed"
                        );
                    }
                    entries.extend(reports);
                }
                Err(e) => {
                    tracing::error!(%kind, sha256 = %evidence.sha256, error = %e, "cannot build containment action");
                    entries.extend(evidence.machines.iter().map(|machine_id| {
                        ContainmentReport {
                            kind,
                            machine_id: machine_id.clone(),
                            action_id: None,
                            status: None,
                            error: Some(e.to_string()),
                        }
                    }));
                }
            }
        }

        RemediationReport {
            verdict,
            sha256: evidence.sha256.clone(),
            entries,
            alerts: Vec::new(),
        }
    }
}

impl<'a, C: MachineActionApi + AlertApi + ?Sized> RemediationPlanner<'a, C> {
    /// Comment the verdict onto every alert that reported the evidence, then
    /// run the containment actions it triggers.
    pub async fn remediate(&self, summary: &VerdictSummary, evidence: &Evidence) -> RemediationReport {
        let alerts = annotate_alerts(self.client, &evidence.alerts, summary).await;
        let mut report = self.run_automated_actions(summary.verdict, evidence).await;
        report.alerts = alerts;
        report
    }
}
