use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use mde_response::download::download_evidences;
use mde_response::ingest::{alert_query, group_by_machine, ingest_alerts};
use mde_response::report::MachineReport;
use mde_response::store::{MemoryStore, ProcessedStore, RedbStore};
use mde_response::{ActionSequencer, Config, Evidence, Machine};
use serde::Serialize;

use crate::connect::{client, load_config, runtime};
use crate::output::{print_json, print_table, short_hash};

#[derive(Serialize)]
struct PlannedMachine<'a> {
    machine_id: &'a str,
    evidences: Vec<PlannedEvidence<'a>>,
}

#[derive(Serialize)]
struct PlannedEvidence<'a> {
    sha256: &'a str,
    absolute_path: &'a str,
    alerts: usize,
}

#[derive(Serialize)]
struct Downloaded {
    sha256: String,
    path: String,
}

pub fn run(path: &Path, dry_run: bool, no_download: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    runtime()?.block_on(acquire(&config, dry_run, no_download, json))
}

async fn acquire(
    config: &Config,
    dry_run: bool,
    no_download: bool,
    json: bool,
) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let api = client(config, &http)?;

    let query = alert_query(&config.alert, Utc::now());
    let alerts = api
        .list_alerts(&query)
        .await
        .context("failed to retrieve alerts")?;

    // A dry run must not mark anything processed.
    let store: Box<dyn ProcessedStore> = if dry_run {
        Box::new(MemoryStore::new())
    } else {
        Box::new(
            RedbStore::open(&config.store.path)
                .with_context(|| format!("failed to open {}", config.store.path.display()))?,
        )
    };
    let evidences = ingest_alerts(&alerts, &config.alert, store.as_ref())?;
    let machines = group_by_machine(&evidences);

    if dry_run {
        return print_plan(&machines, json);
    }

    let sequencer = ActionSequencer::new(&api, &config.machine_action);
    let machines = sequencer.acquire_evidence_files(machines).await;
    let reports: Vec<MachineReport> = machines.iter().map(Machine::report).collect();

    let downloaded = if no_download {
        Vec::new()
    } else {
        // one copy per hash, even if several machines returned it
        let mut acquired: BTreeMap<String, Evidence> = BTreeMap::new();
        for evidence in machines.iter().flat_map(|m| m.acquired()) {
            acquired
                .entry(evidence.sha256.clone())
                .or_insert_with(|| evidence.clone());
        }
        download_evidences(&http, acquired.into_values().collect(), &config.download.dir).await
    };
    let downloaded: Vec<Downloaded> = downloaded
        .into_iter()
        .filter_map(|e| {
            e.download_path.map(|p| Downloaded {
                sha256: e.sha256,
                path: p.display().to_string(),
            })
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({
            "machines": reports,
            "downloaded": downloaded,
        }));
    }
    print_report(&reports, &downloaded);
    Ok(())
}

fn print_plan(machines: &[Machine], json: bool) -> anyhow::Result<()> {
    let planned: Vec<PlannedMachine> = machines
        .iter()
        .map(|m| PlannedMachine {
            machine_id: &m.id,
            evidences: m
                .pending
                .iter()
                .map(|e| PlannedEvidence {
                    sha256: &e.sha256,
                    absolute_path: &e.absolute_path,
                    alerts: e.alerts.len(),
                })
                .collect(),
        })
        .collect();

    if json {
        return print_json(&serde_json::json!({ "dry_run": true, "machines": planned }));
    }
    if planned.is_empty() {
        println!("No new evidence in the alert window.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = planned
        .iter()
        .flat_map(|m| {
            m.evidences.iter().map(|e| {
                vec![
                    m.machine_id.to_string(),
                    short_hash(e.sha256),
                    e.absolute_path.to_string(),
                    e.alerts.to_string(),
                ]
            })
        })
        .collect();
    print_table(&["MACHINE", "SHA256", "PATH", "ALERTS"], &rows);
    Ok(())
}

fn print_report(reports: &[MachineReport], downloaded: &[Downloaded]) {
    if reports.is_empty() {
        println!("No new evidence in the alert window.");
        return;
    }
    let rows: Vec<Vec<String>> = reports
        .iter()
        .flat_map(|r| {
            r.outcomes.iter().map(|o| {
                vec![
                    r.machine_id.clone(),
                    short_hash(&o.sha256),
                    o.absolute_path.clone(),
                    o.outcome.label().to_string(),
                ]
            })
        })
        .collect();
    print_table(&["MACHINE", "SHA256", "PATH", "OUTCOME"], &rows);

    for r in reports.iter().filter(|r| r.exhausted) {
        println!("\nmachine {} stayed busy; remaining evidence skipped", r.machine_id);
    }
    if !downloaded.is_empty() {
        println!();
        let rows: Vec<Vec<String>> = downloaded
            .iter()
            .map(|d| vec![short_hash(&d.sha256), d.path.clone()])
            .collect();
        print_table(&["SHA256", "FILE"], &rows);
    }
}
