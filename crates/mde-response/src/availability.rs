use mde_client::{MachineActionApi, RemoteApiError};

use crate::config::StatusConfig;

/// Result of one point-in-time look at a machine's action list.
#[derive(Debug)]
pub enum Availability {
    Available,
    Busy {
        action_id: String,
        action_type: String,
        status: String,
    },
    /// The action list could not be read.
    Unknown(RemoteApiError),
}

impl Availability {
    /// Only a successful read with no busy action counts as available.
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Decides whether a machine may take a new action, from the vendor's own
/// view of its outstanding actions. Holds no state between checks.
pub struct AvailabilityGate<'a, C: ?Sized> {
    client: &'a C,
    statuses: &'a StatusConfig,
}

impl<'a, C: MachineActionApi + ?Sized> AvailabilityGate<'a, C> {
    pub fn new(client: &'a C, statuses: &'a StatusConfig) -> Self {
        Self { client, statuses }
    }

    pub async fn check(&self, machine_id: &str) -> Availability {
        let actions = match self.client.list_actions(machine_id).await {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(machine_id, error = %e, "could not list machine actions");
                return Availability::Unknown(e);
            }
        };

        if let Some(busy) = actions.iter().find(|a| self.statuses.is_busy(&a.status)) {
            tracing::warn!(
                machine_id,
                action_id = %busy.id,
                action_type = %busy.action_type,
                status = %busy.status,
                "machine is busy"
            );
            return Availability::Busy {
                action_id: busy.id.clone(),
                action_type: busy.action_type.clone(),
                status: busy.status.clone(),
            };
        }

        tracing::info!(machine_id, "machine is available");
        Availability::Available
    }

    pub async fn is_available(&self, machine_id: &str) -> bool {
        self.check(machine_id).await.is_available()
    }
}
