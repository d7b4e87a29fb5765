use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::{RemoteApiError, Result};

/// Tokens are refreshed this long before their stated expiry.
const REFRESH_SKEW_SECS: i64 = 60;

// ─── Credentials ──────────────────────────────────────────────────────────

/// Client-credentials grant parameters for the Azure AD application.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub auth_url: String,
    pub resource: String,
    pub client_id: String,
    pub client_secret: String,
}

// ─── Session ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Bearer-token session handed to [`DefenderClient`](crate::DefenderClient).
///
/// The token is fetched lazily on the first request and refreshed once it is
/// within a minute of expiry. A session built with [`Session::from_token`]
/// never refreshes.
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    credentials: Option<Credentials>,
    token: Mutex<Option<CachedToken>>,
}

impl Session {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Session {
            http,
            credentials: Some(credentials),
            token: Mutex::new(None),
        }
    }

    /// A session around a pre-issued token.
    pub fn from_token(token: impl Into<String>) -> Self {
        Session {
            http: reqwest::Client::new(),
            credentials: None,
            token: Mutex::new(Some(CachedToken {
                value: token.into(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            })),
        }
    }

    /// Return a valid bearer token, refreshing it if needed.
    pub async fn bearer(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - Duration::seconds(REFRESH_SKEW_SECS) > Utc::now() {
                return Ok(cached.value.clone());
            }
        }

        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| RemoteApiError::Auth("token expired and no credentials".into()))?;
        let fresh = self.fetch(creds).await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        if self.credentials.is_some() {
            *self.token.lock().await = None;
        }
    }

    async fn fetch(&self, creds: &Credentials) -> Result<CachedToken> {
        let form = [
            ("resource", creds.resource.as_str()),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];
        let response = self
            .http
            .post(&creds.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RemoteApiError::Auth(e.to_string()))?;
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RemoteApiError::Auth(format!("HTTP {status}: {e}")))?;

        let Some(token) = body.get("access_token").and_then(|v| v.as_str()) else {
            let reason = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("access_token missing from response");
            return Err(RemoteApiError::Auth(reason.to_string()));
        };

        // AAD v1 sends `expires_in` as a string, v2 as a number.
        let expires_in = match body.get("expires_in") {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(3599);

        tracing::debug!(expires_in, "acquired API access token");
        Ok(CachedToken {
            value: token.to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
