//! Scripted in-process `MachineActionApi` / `AlertApi` for engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use mde_client::{
    ActionKind, ActionRecord, ActionRequest, AlertApi, MachineActionApi, RemoteApiError,
};

/// What `list_actions` reports for a machine.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Listing {
    Idle,
    Busy(&'static str),
    Error,
}

/// What `get_action` reports for an action.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Poll {
    Status(&'static str),
    Failed(&'static str),
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List(String),
    Submit(String, ActionKind),
    Get(String),
    Cancel(String),
    Link(String, u32),
    Comment(String, String),
}

/// A scripted submission failure. `times: None` rejects forever.
#[derive(Debug, Clone, Copy)]
struct Rejection {
    code: Option<&'static str>,
    message: &'static str,
    times: Option<u32>,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    listings: HashMap<String, VecDeque<Listing>>,
    polls: HashMap<String, VecDeque<Poll>>,
    rejected: HashMap<String, Rejection>,
    owners: HashMap<String, String>,
    without_get_file: bool,
    cancel_result: Option<bool>,
    missing_alerts: HashSet<String>,
    calls: Vec<Call>,
}

/// Each script is consumed front to back; its last entry is sticky.
/// Unscripted machines are idle and unscripted actions succeed.
#[derive(Default)]
pub(crate) struct FakeApi {
    inner: Mutex<Inner>,
}

fn next<T: Copy>(queue: Option<&mut VecDeque<T>>, default: T) -> T {
    match queue {
        Some(q) if q.len() > 1 => q.pop_front().unwrap_or(default),
        Some(q) => q.front().copied().unwrap_or(default),
        None => default,
    }
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script_listing(&self, machine_id: &str, listing: Vec<Listing>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .listings
            .insert(machine_id.to_string(), listing.into());
        self
    }

    /// Statuses returned for every action submitted on `machine_id`.
    pub(crate) fn script_polls(&self, machine_id: &str, polls: Vec<Poll>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .polls
            .insert(machine_id.to_string(), polls.into());
        self
    }

    pub(crate) fn reject_submit(&self, machine_id: &str, message: &'static str) -> &Self {
        self.reject(machine_id, Rejection {
            code: None,
            message,
            times: None,
        })
    }

    /// The next `times` submissions on `machine_id` fail with the vendor's
    /// "another action is already running" code.
    pub(crate) fn reject_busy(&self, machine_id: &str, times: u32) -> &Self {
        self.reject(machine_id, Rejection {
            code: Some("ActiveRequestAlreadyExists"),
            message: "Action is already in progress",
            times: Some(times),
        })
    }

    fn reject(&self, machine_id: &str, rejection: Rejection) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .rejected
            .insert(machine_id.to_string(), rejection);
        self
    }

    pub(crate) fn without_get_file(&self) -> &Self {
        self.inner.lock().unwrap().without_get_file = true;
        self
    }

    pub(crate) fn reject_alert(&self, alert_id: &str) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .missing_alerts
            .insert(alert_id.to_string());
        self
    }

    pub(crate) fn cancel_returns(&self, result: bool) -> &Self {
        self.inner.lock().unwrap().cancel_result = Some(result);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub(crate) fn submits(&self) -> Vec<(String, ActionKind)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit(m, k) => Some((m, k)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

fn record(id: &str, status: &str, kind: &str, error: Option<&str>, get_file: bool) -> ActionRecord {
    let commands = if get_file {
        let errors: Vec<&str> = error.into_iter().collect();
        serde_json::json!([{
            "index": 0,
            "commandStatus": status,
            "errors": errors,
            "command": {"type": "GetFile", "params": []}
        }])
    } else {
        serde_json::json!([])
    };
    serde_json::from_value(serde_json::json!({
        "id": id,
        "type": kind,
        "status": status,
        "commands": commands,
    }))
    .unwrap()
}

fn unavailable() -> RemoteApiError {
    RemoteApiError::Http {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

#[async_trait]
impl MachineActionApi for FakeApi {
    async fn submit_action(
        &self,
        machine_id: &str,
        request: &ActionRequest,
    ) -> mde_client::Result<ActionRecord> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(Call::Submit(machine_id.to_string(), request.kind()));
        if let Some(rejection) = inner.rejected.get_mut(machine_id) {
            if rejection.times != Some(0) {
                if let Some(n) = rejection.times.as_mut() {
                    *n -= 1;
                }
                return Err(RemoteApiError::Vendor {
                    code: rejection.code.map(str::to_string),
                    message: rejection.message.to_string(),
                });
            }
        }
        inner.next_id += 1;
        let id = format!("act-{}", inner.next_id);
        inner.owners.insert(id.clone(), machine_id.to_string());
        Ok(record(&id, "Pending", request.kind().as_str(), None, false))
    }

    async fn get_action(&self, action_id: &str) -> mde_client::Result<ActionRecord> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Get(action_id.to_string()));
        let owner = inner.owners.get(action_id).cloned().unwrap_or_default();
        let get_file = !inner.without_get_file;
        match next(inner.polls.get_mut(&owner), Poll::Status("Succeeded")) {
            Poll::Status(s) => Ok(record(action_id, s, "LiveResponse", None, get_file)),
            Poll::Failed(e) => Ok(record(action_id, "Failed", "LiveResponse", Some(e), get_file)),
            Poll::Error => Err(unavailable()),
        }
    }

    async fn list_actions(&self, machine_id: &str) -> mde_client::Result<Vec<ActionRecord>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::List(machine_id.to_string()));
        match next(inner.listings.get_mut(machine_id), Listing::Idle) {
            Listing::Idle => Ok(vec![record("old", "Succeeded", "Isolate", None, false)]),
            Listing::Busy(s) => Ok(vec![
                record("old", "Succeeded", "Isolate", None, false),
                record("other", s, "LiveResponse", None, false),
            ]),
            Listing::Error => Err(unavailable()),
        }
    }

    async fn cancel_action(&self, action_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Cancel(action_id.to_string()));
        inner.cancel_result.unwrap_or(true)
    }

    async fn live_response_download_link(
        &self,
        action_id: &str,
        index: u32,
    ) -> mde_client::Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Link(action_id.to_string(), index));
        Ok(format!("https://blob.example/{action_id}.gz"))
    }
}

#[async_trait]
impl AlertApi for FakeApi {
    async fn update_alert_comment(&self, alert_id: &str, comment: &str) -> mde_client::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(Call::Comment(alert_id.to_string(), comment.to_string()));
        if inner.missing_alerts.contains(alert_id) {
            return Err(RemoteApiError::Vendor {
                code: Some("NotFound".to_string()),
                message: "Alert not found".to_string(),
            });
        }
        Ok(())
    }
}
