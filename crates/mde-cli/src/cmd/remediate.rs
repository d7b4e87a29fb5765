use crate::connect::{client, load_config, runtime};
use crate::output::{print_json, print_table, short_hash};
use clap::Args;
use mde_response::{Evidence, RemediationPlanner, Verdict, VerdictSummary};
use std::path::Path;

#[derive(Args)]
pub struct RemediateArgs {
    /// Sample verdict: clean, suspicious or malicious
    #[arg(long)]
    pub verdict: Verdict,
    #[arg(long)]
    pub sha256: String,
    /// Needed for quarantine
    #[arg(long)]
    pub sha1: Option<String>,
    /// Machine the sample was observed on (repeatable)
    #[arg(long = "machine", value_name = "MACHINE_ID", required = true)]
    pub machines: Vec<String>,
    /// Alert that reported the sample; its comment gets the verdict (repeatable)
    #[arg(long = "alert", value_name = "ALERT_ID")]
    pub alerts: Vec<String>,
    /// Link to the analysis, added to the alert comment
    #[arg(long)]
    pub sample_url: Option<String>,
    #[arg(long = "classification")]
    pub classifications: Vec<String>,
    #[arg(long = "threat-name")]
    pub threat_names: Vec<String>,
}

pub fn run(path: &Path, args: RemediateArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let Some((first, _)) = args.machines.split_first() else {
        anyhow::bail!("at least one --machine is required");
    };

    let mut evidence = Evidence::new(&args.sha256, args.sha1.clone(), "", "", first.as_str());
    for machine_id in &args.machines {
        evidence.machines.insert(machine_id.clone());
    }
    evidence.alerts.extend(args.alerts.iter().cloned());

    let summary = VerdictSummary {
        sample_url: args.sample_url,
        classifications: args.classifications,
        threat_names: args.threat_names,
        ..VerdictSummary::new(&args.sha256, args.verdict)
    };

    let http = reqwest::Client::new();
    let api = client(&config, &http)?;
    let planner = RemediationPlanner::new(&api, &config.machine_action);
    let report = runtime()?.block_on(planner.remediate(&summary, &evidence));

    if json {
        return print_json(&report);
    }

    if !report.alerts.is_empty() {
        let rows: Vec<Vec<String>> = report
            .alerts
            .iter()
            .map(|a| {
                let status = if a.updated() { "updated" } else { "failed" };
                vec![a.alert_id.clone(), status.to_string(), a.error.clone().unwrap_or_default()]
            })
            .collect();
        print_table(&["ALERT", "COMMENT", "ERROR"], &rows);
        println!();
    }

    if report.entries.is_empty() {
        println!(
            "No containment actions enabled for verdict '{}' on {}.",
            args.verdict,
            short_hash(&args.sha256)
        );
        return Ok(());
    }

    let rows: Vec<Vec<String>> = report
        .entries
        .iter()
        .map(|e| {
            vec![
                e.kind.to_string(),
                e.machine_id.clone(),
                e.action_id.clone().unwrap_or_else(|| "-".to_string()),
                e.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                e.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ACTION", "MACHINE", "ACTION ID", "STATUS", "ERROR"], &rows);

    let failures = report.failures();
    if failures > 0 {
        println!("\n{failures} of {} containment actions did not succeed.", report.entries.len());
    }
    Ok(())
}
