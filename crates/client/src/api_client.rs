//! HTTP API client carrying the session cookie.

use std::time::Duration;

use matchwire_shared::ApiError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

/// Name of the cookie the API issues on login.
pub const SESSION_COOKIE: &str = "session_token";

/// Applied to every request unless overridden.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the matchmaking API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    session_token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
            session_token: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Attach the session token sent as a cookie with every request
    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }

    /// Fail requests that take longer than `timeout` with [`ApiError::Network`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        let rb = rb.timeout(self.timeout);
        match &self.session_token {
            Some(token) => rb.header(reqwest::header::COOKIE, format!("{SESSION_COOKIE}={token}")),
            None => rb,
        }
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.client.get(self.url(path));
        self.send(rb).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.client.post(self.url(path));
        self.send(rb).await
    }

    async fn send<TRes: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<TRes, ApiError> {
        let resp = self
            .authorize(rb)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }
}
