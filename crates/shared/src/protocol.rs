//! Wire protocol spoken over the live-update WebSocket.
//!
//! Two kinds of text frames travel on the socket:
//!
//! - bare keepalive tokens: the client sends [`PING`], the server answers
//!   [`PONG`];
//! - JSON envelopes of the form `{"type": "...", "data": {...}}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Keepalive probe sent by the client.
pub const PING: &str = "ping";

/// Keepalive reply sent by the server.
pub const PONG: &str = "pong";

/// Payload carried by an envelope.
pub type EventData = Map<String, Value>;

/// Application-level unit carried over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Missing or `null` data is an empty mapping.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: EventData,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<EventData, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<EventData>::deserialize(deserializer)?.unwrap_or_default())
}

impl Envelope {
    pub fn new(event_type: impl Into<String>, data: EventData) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Encode as a text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Classification of an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Keepalive reply; never dispatched.
    Pong,
    Event(Envelope),
}

/// Classify an inbound text frame.
///
/// Returns `None` for protocol noise: unparsable JSON, non-object payloads,
/// a missing or empty `type`, or a `data` field that is not a mapping.
pub fn parse_frame(text: &str) -> Option<InboundFrame> {
    if text == PONG {
        return Some(InboundFrame::Pong);
    }
    let envelope: Envelope = serde_json::from_str(text).ok()?;
    if envelope.event_type.is_empty() {
        return None;
    }
    Some(InboundFrame::Event(envelope))
}
