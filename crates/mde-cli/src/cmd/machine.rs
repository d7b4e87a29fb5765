use crate::connect::{client, load_config, runtime};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use mde_client::MachineActionApi;
use mde_response::{Availability, AvailabilityGate};
use std::path::Path;

#[derive(Subcommand)]
pub enum MachineSubcommand {
    /// Show whether a machine can take a new action, and its action history
    Status {
        /// Defender machine id
        machine_id: String,
    },
}

pub fn run(path: &Path, subcmd: MachineSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        MachineSubcommand::Status { machine_id } => status(path, &machine_id, json),
    }
}

fn status(path: &Path, machine_id: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let http = reqwest::Client::new();
    let api = client(&config, &http)?;

    runtime()?.block_on(async {
        let gate = AvailabilityGate::new(&api, &config.machine_action.statuses);
        let busy = match gate.check(machine_id).await {
            Availability::Available => None,
            Availability::Busy {
                action_id,
                action_type,
                status,
            } => Some((action_id, action_type, status)),
            Availability::Unknown(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to list actions for machine {machine_id}")))
            }
        };
        let actions = api
            .list_actions(machine_id)
            .await
            .with_context(|| format!("failed to list actions for machine {machine_id}"))?;

        if json {
            let busy_json = busy.as_ref().map(|(id, kind, status)| {
                serde_json::json!({ "action_id": id, "type": kind, "status": status })
            });
            return print_json(&serde_json::json!({
                "machine_id": machine_id,
                "available": busy.is_none(),
                "busy": busy_json,
                "actions": actions,
            }));
        }

        match &busy {
            None => println!("Machine {machine_id} is available."),
            Some((id, kind, status)) => {
                println!("Machine {machine_id} is busy: {kind} {id} is {status}.")
            }
        }
        if actions.is_empty() {
            return Ok(());
        }
        println!();
        let rows: Vec<Vec<String>> = actions
            .iter()
            .map(|a| {
                vec![
                    a.id.clone(),
                    a.action_type.clone(),
                    a.status.clone(),
                    a.creation_date_time_utc.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["ACTION", "TYPE", "STATUS", "CREATED"], &rows);
        Ok(())
    })
}
