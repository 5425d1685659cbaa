//! Single-use tickets that authorize one socket connection attempt.

use std::fmt;

use async_trait::async_trait;
use matchwire_shared::ApiError;
use serde::Deserialize;

use crate::api_client::ApiClient;

/// Opaque short-lived credential. Consumed by the attempt that fetched it.
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket(String);

impl Ticket {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ticket(<redacted>)")
    }
}

/// Source of connection tickets.
#[async_trait]
pub trait TicketIssuer: Send + Sync {
    async fn issue(&self) -> Result<Ticket, ApiError>;
}

#[derive(Deserialize)]
struct TicketResponse {
    ticket: String,
}

/// Fetches tickets from the API's ticket endpoint with the session cookie.
#[derive(Debug, Clone)]
pub struct HttpTicketIssuer {
    api: ApiClient,
    path: String,
}

impl HttpTicketIssuer {
    pub fn new(api: ApiClient, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
        }
    }
}

#[async_trait]
impl TicketIssuer for HttpTicketIssuer {
    async fn issue(&self) -> Result<Ticket, ApiError> {
        let resp: TicketResponse = self.api.post_empty(&self.path).await?;
        Ok(Ticket(resp.ticket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_value() {
        let ticket = Ticket::new("s3cr3t");
        assert!(!format!("{ticket:?}").contains("s3cr3t"));
        assert_eq!(ticket.as_str(), "s3cr3t");
    }
}
