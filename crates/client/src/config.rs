//! Client configuration from environment variables.

use std::time::Duration;

use anyhow::{anyhow, Context};
use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Where and how the live connection is established.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL of the HTTP API; its scheme decides `ws` vs `wss`.
    pub api_url: Url,
    pub ticket_path: String,
    pub ws_path: String,
    pub reconnect: ReconnectConfig,
    /// Interval between keepalive probes while open.
    pub keepalive_interval: Duration,
}

impl ConnectionConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            ticket_path: "/api/ws/ticket".to_string(),
            ws_path: "/api/ws".to_string(),
            reconnect: ReconnectConfig::default(),
            keepalive_interval: Duration::from_secs(30),
        }
    }

    /// Build the socket URL for one attempt, carrying `ticket` as a query parameter.
    pub fn ws_url(&self, ticket: &str) -> anyhow::Result<Url> {
        let mut url = self.api_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| anyhow!("cannot derive a {scheme} URL from {}", self.api_url))?;
        url.set_path(&self.ws_path);
        url.set_fragment(None);
        url.query_pairs_mut().clear().append_pair("ticket", ticket);
        Ok(url)
    }
}

/// Full configuration of the `matchwire-client` binary.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub session_token: Option<String>,
    /// Path re-fetched by the fallback poller; polling is off when unset.
    pub poll_path: Option<String>,
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MATCHWIRE_API_URL`: API base URL (default: "http://localhost:8000")
    /// - `MATCHWIRE_SESSION_TOKEN`: session cookie value (default: none)
    /// - `MATCHWIRE_POLL_PATH`: path to poll, e.g. "/api/recruitments" (default: none)
    /// - `MATCHWIRE_POLL_INTERVAL_MS`: polling interval (default: 3000)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_url = lookup("MATCHWIRE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&api_url).with_context(|| format!("invalid MATCHWIRE_API_URL {api_url:?}"))?;

        let poll_interval_ms = match lookup("MATCHWIRE_POLL_INTERVAL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid MATCHWIRE_POLL_INTERVAL_MS {raw:?}"))?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        Ok(Self {
            connection: ConnectionConfig::new(api_url),
            session_token: lookup("MATCHWIRE_SESSION_TOKEN").filter(|t| !t.is_empty()),
            poll_path: lookup("MATCHWIRE_POLL_PATH").filter(|p| !p.is_empty()),
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }
}
