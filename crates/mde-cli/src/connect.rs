use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use mde_client::{Credentials, DefenderClient, Session};
use mde_response::config::CLIENT_SECRET_ENV;
use mde_response::Config;

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// Build an authenticated client from `config`. No request is made until
/// the first API call.
pub fn client(config: &Config, http: &reqwest::Client) -> anyhow::Result<DefenderClient> {
    let client_secret = config.api.resolve_secret().with_context(|| {
        format!("no client secret: set api.client_secret or {CLIENT_SECRET_ENV}")
    })?;
    let credentials = Credentials {
        auth_url: config.api.auth_url.clone(),
        resource: config.api.resource.clone(),
        client_id: config.api.client_id.clone(),
        client_secret,
    };
    let session = Arc::new(Session::new(http.clone(), credentials));
    Ok(DefenderClient::new(
        http.clone(),
        config.api.url.as_str(),
        config.api.user_agent.as_str(),
        session,
    ))
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start tokio runtime")
}
