//! Alert comments carrying an evidence file's analysis result.

use std::collections::BTreeSet;

use mde_client::AlertApi;
use serde::{Deserialize, Serialize};

use crate::report::AlertUpdate;
use crate::types::Verdict;

/// What an external analysis concluded about one evidence file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub sha256: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threat_names: Vec<String>,
}

impl VerdictSummary {
    pub fn new(sha256: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            sha256: sha256.into(),
            verdict,
            sample_url: None,
            classifications: Vec::new(),
            threat_names: Vec::new(),
        }
    }

    /// Plain-text alert comment. Empty sections are left out.
    pub fn comment(&self) -> String {
        let mut out = format!(
            "Evidence SHA256:\n{}\n\nVerdict: {}\n\n",
            self.sha256,
            self.verdict.as_str().to_ascii_uppercase()
        );
        if let Some(url) = &self.sample_url {
            out.push_str(&format!("Sample Url:\n{url}\n\n"));
        }
        if !self.classifications.is_empty() {
            out.push_str(&format!("Classifications:\n{}\n\n", self.classifications.join("\n")));
        }
        if !self.threat_names.is_empty() {
            out.push_str(&format!("Threat Names:\n{}\n\n", self.threat_names.join("\n")));
        }
        out
    }
}

/// Post `summary` as the comment of every alert in `alert_ids`.
///
/// Best effort: a failed update is logged and reported, and the remaining
/// alerts are still tried.
pub async fn annotate_alerts<C: AlertApi + ?Sized>(
    client: &C,
    alert_ids: &BTreeSet<String>,
    summary: &VerdictSummary,
) -> Vec<AlertUpdate> {
    let comment = summary.comment();
    let mut updates = Vec::with_capacity(alert_ids.len());
    for alert_id in alert_ids {
        let error = match client.update_alert_comment(alert_id, &comment).await {
            Ok(()) => {
                tracing::info!(alert_id = %alert_id, sha256 = %summary.sha256, "alert comment updated");
                None
            }
            Err(e) => {
                tracing::error!(alert_id = %alert_id, error = %e, "failed to update alert");
                Some(e.to_string())
            }
        };
        updates.push(AlertUpdate {
            alert_id: alert_id.clone(),
            error,
        });
    }
    updates
}
