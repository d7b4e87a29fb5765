use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::session::Session;
use crate::types::{ActionRecord, ActionRequest, Alert, ODataList, ODataValue, VendorErrorBody};
use crate::{RemoteApiError, Result};

const CANCEL_COMMENT: &str = "Machine action cancelled by mde-response after job timeout";

// ─── MachineActionApi ─────────────────────────────────────────────────────

/// Request/response operations against the vendor machine-action API.
///
/// Implementations are pure transport: one HTTP exchange per call and no
/// retries. Retrying is the caller's job.
#[async_trait]
pub trait MachineActionApi: Send + Sync {
    /// Submit `request` against `machine_id`; returns the created action.
    async fn submit_action(&self, machine_id: &str, request: &ActionRequest)
        -> Result<ActionRecord>;

    async fn get_action(&self, action_id: &str) -> Result<ActionRecord>;

    /// Every action the vendor tracks for `machine_id`, in any state.
    async fn list_actions(&self, machine_id: &str) -> Result<Vec<ActionRecord>>;

    /// Best-effort cancellation. Failures are logged, never raised.
    async fn cancel_action(&self, action_id: &str) -> bool;

    /// Resolve the download URL of a finished live-response command.
    async fn live_response_download_link(&self, action_id: &str, index: u32) -> Result<String>;
}

/// Write access to alerts, used to annotate them with analysis results.
#[async_trait]
pub trait AlertApi: Send + Sync {
    /// Replace the comment on `alert_id`.
    async fn update_alert_comment(&self, alert_id: &str, comment: &str) -> Result<()>;
}

// ─── AlertQuery ───────────────────────────────────────────────────────────

/// OData filter for `GET /api/alerts`.
#[derive(Debug, Clone)]
pub struct AlertQuery {
    pub since: DateTime<Utc>,
    pub statuses: Vec<String>,
    pub severities: Vec<String>,
    pub top: u32,
}

impl AlertQuery {
    pub fn filter(&self) -> String {
        let mut filter = format!(
            "alertCreationTime ge {}",
            self.since.format("%Y-%m-%dT%H:%M:%SZ")
        );
        if !self.statuses.is_empty() {
            filter.push_str(&format!(" and status in ({})", quoted_list(&self.statuses)));
        }
        if !self.severities.is_empty() {
            filter.push_str(&format!(
                " and severity in ({})",
                quoted_list(&self.severities)
            ));
        }
        filter
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("$filter", self.filter()),
            ("$expand", "evidence".to_string()),
            ("$top", self.top.to_string()),
        ]
    }
}

fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(",")
}

// ─── DefenderClient ───────────────────────────────────────────────────────

/// reqwest-backed client for the Defender for Endpoint REST API.
#[derive(Debug, Clone)]
pub struct DefenderClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    session: Arc<Session>,
}

impl DefenderClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        user_agent: impl Into<String>,
        session: Arc<Session>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        DefenderClient {
            http,
            base_url,
            user_agent: user_agent.into(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Alerts matching `query`, with evidence expanded.
    ///
    /// Each alert is decoded on its own: one the vendor returns in an
    /// unexpected shape is logged and dropped, the rest still come back.
    pub async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let url = self.url("/api/alerts");
        let list: ODataList<serde_json::Value> =
            self.send(self.http.get(url).query(&query.params())).await?;

        let mut alerts = Vec::with_capacity(list.value.len());
        for raw in list.value {
            let alert_id = raw
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("<missing>")
                .to_string();
            match serde_json::from_value::<Alert>(raw) {
                Ok(alert) => alerts.push(alert),
                Err(e) => tracing::warn!(alert_id, error = %e, "skipping unparseable alert"),
            }
        }
        Ok(alerts)
    }


    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let token = self.session.bearer().await?;
        let response = request
            .bearer_auth(token)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
        }
        let body = response.text().await?;
        decode(status, &body)
    }
}

/// Map a raw response to `T` or the matching [`RemoteApiError`].
///
/// A body with an `error` object wins over the HTTP status: the vendor sends
/// its own message with 4xx codes and occasionally with 200.
pub(crate) fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => return Err(RemoteApiError::Malformed(e.to_string())),
        Err(_) => {
            return Err(RemoteApiError::Http {
                status: status.as_u16(),
                body: body.to_string(),
            })
        }
    };

    if value.get("error").is_some() {
        let (code, message) = match serde_json::from_value::<VendorErrorBody>(value) {
            Ok(VendorErrorBody { error }) => (error.code, error.message),
            Err(_) => (None, String::new()),
        };
        let message = if message.is_empty() {
            "unspecified vendor error".to_string()
        } else {
            message
        };
        return Err(RemoteApiError::Vendor { code, message });
    }

    if !status.is_success() {
        return Err(RemoteApiError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| RemoteApiError::Malformed(e.to_string()))
}

#[async_trait]
impl MachineActionApi for DefenderClient {
    async fn submit_action(
        &self,
        machine_id: &str,
        request: &ActionRequest,
    ) -> Result<ActionRecord> {
        let url = self.url(&format!(
            "/api/machines/{machine_id}/{}",
            request.kind().endpoint()
        ));
        self.send(self.http.post(url).json(&request.payload())).await
    }

    async fn get_action(&self, action_id: &str) -> Result<ActionRecord> {
        let url = self.url(&format!("/api/machineactions/{action_id}"));
        self.send(self.http.get(url)).await
    }

    async fn list_actions(&self, machine_id: &str) -> Result<Vec<ActionRecord>> {
        let url = self.url("/api/machineactions");
        let filter = format!("machineId eq '{machine_id}'");
        let list: ODataList<ActionRecord> = self
            .send(self.http.get(url).query(&[("$filter", filter)]))
            .await?;
        Ok(list.value)
    }

    async fn cancel_action(&self, action_id: &str) -> bool {
        let url = self.url(&format!("/api/machineactions/{action_id}/cancel"));
        let body = serde_json::json!({ "Comment": CANCEL_COMMENT });
        match self
            .send::<serde_json::Value>(self.http.post(url).json(&body))
            .await
        {
            Ok(_) => {
                tracing::info!(action_id, "cancelled machine action");
                true
            }
            Err(e) => {
                tracing::error!(action_id, error = %e, "failed to cancel machine action");
                false
            }
        }
    }

    async fn live_response_download_link(&self, action_id: &str, index: u32) -> Result<String> {
        let url = self.url(&format!(
            "/api/machineactions/{action_id}/GetLiveResponseResultDownloadLink(index={index})"
        ));
        let link: ODataValue<String> = self.send(self.http.get(url)).await?;
        Ok(link.value)
    }
}

#[async_trait]
impl AlertApi for DefenderClient {
    async fn update_alert_comment(&self, alert_id: &str, comment: &str) -> Result<()> {
        let url = self.url(&format!("/api/alerts/{alert_id}"));
        let body = serde_json::json!({ "comment": comment });
        self.send::<serde_json::Value>(self.http.patch(url).json(&body))
            .await
            .map(|_| ())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
