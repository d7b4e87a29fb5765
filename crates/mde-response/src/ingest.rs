use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use mde_client::{Alert, AlertQuery};

use crate::config::AlertConfig;
use crate::error::Result;
use crate::evidence::{Evidence, Machine};
use crate::store::{processed_key, ProcessedStore};

/// Alert query covering the configured lookback window ending at `now`.
pub fn alert_query(config: &AlertConfig, now: DateTime<Utc>) -> AlertQuery {
    let span = Duration::try_seconds(i64::try_from(config.time_span_secs).unwrap_or(i64::MAX))
        .unwrap_or(Duration::MAX);
    AlertQuery {
        since: now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
        statuses: config.statuses.clone(),
        severities: config.severities.clone(),
        top: config.max_alert_count,
    }
}

/// Collect file evidence from `alerts`, keyed by sha256.
///
/// Evidence already seen for the same alert (per `store`) is skipped and new
/// pairs are recorded. A hash seen in several alerts becomes one
/// [`Evidence`] carrying every alert and machine id.
pub fn ingest_alerts(
    alerts: &[Alert],
    config: &AlertConfig,
    store: &dyn ProcessedStore,
) -> Result<BTreeMap<String, Evidence>> {
    let mut evidences: BTreeMap<String, Evidence> = BTreeMap::new();

    for alert in alerts {
        let Some(machine_id) = alert.machine_id.as_deref().filter(|m| !m.is_empty()) else {
            if !alert.evidence.is_empty() {
                tracing::warn!(alert_id = %alert.id, "alert has no machine id, skipping");
            }
            continue;
        };
        for item in &alert.evidence {
            let Some(entity_type) = item.entity_type.as_deref() else {
                tracing::warn!(alert_id = %alert.id, "evidence without entity type, skipping");
                continue;
            };
            if !config.evidence_entity_types.iter().any(|t| t == entity_type) {
                continue;
            }
            let Some(sha256) = item
                .sha256
                .as_deref()
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none"))
            else {
                continue;
            };

            let key = processed_key(&alert.id, sha256);
            if store.contains(&key)? {
                tracing::debug!(alert_id = %alert.id, sha256, "evidence already processed");
                continue;
            }
            store.insert(&key)?;

            evidences
                .entry(sha256.to_string())
                .or_insert_with(|| {
                    let mut evidence = Evidence::new(
                        sha256,
                        item.sha1.clone().filter(|s| !s.eq_ignore_ascii_case("none")),
                        item.file_name.clone().unwrap_or_default(),
                        item.file_path.as_deref().unwrap_or_default(),
                        machine_id,
                    );
                    evidence.severity = alert.severity.clone();
                    evidence
                })
                .observe(&alert.id, machine_id);
        }
    }

    tracing::info!(
        evidences = evidences.len(),
        alerts = alerts.len(),
        "collected evidence from alerts"
    );
    Ok(evidences)
}

/// One [`Machine`] per machine id that observed any evidence, each queued
/// with its own copy of that evidence in sha256 order.
pub fn group_by_machine(evidences: &BTreeMap<String, Evidence>) -> Vec<Machine> {
    let ids: BTreeSet<&String> = evidences.values().flat_map(|e| e.machines.iter()).collect();
    ids.into_iter()
        .map(|id| {
            let mut machine = Machine::new(id.clone());
            for evidence in evidences.values().filter(|e| e.machines.contains(id)) {
                machine.enqueue(evidence.clone());
            }
            machine
        })
        .collect()
}
