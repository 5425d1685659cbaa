//! Live-update WebSocket channel.
//!
//! This module provides:
//! - Ticket-authenticated connection with keepalive and auto-reconnect
//! - Per-event-type handler fan-out
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   POST /api/ws/ticket   ┌──────────────┐
//! │    LiveConnection    │ ──────────────────────▶ │ TicketIssuer │
//! │  (handle held by a   │                         └──────────────┘
//! │   view or service)   │   ws(s)://host/api/ws   ┌──────────────┐
//! │          │           │ ──────────────────────▶ │  Connector   │
//! │          ▼           │                         └──────────────┘
//! │   driver task        │
//! │   Connecting ─▶ Open ─▶ Backoff ─▶ Connecting ...
//! └──────────┬───────────┘
//!            ▼
//!  ┌─────────────────────┐
//!  │   HandlerRegistry   │  "new_message" ─▶ [handler, handler]
//!  └─────────────────────┘  "room_closed" ─▶ [handler]
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let conn = LiveConnection::with_api(config.connection.clone(), api.clone());
//! let on_message = handler(|data| {
//!     tracing::info!(?data, "new message");
//!     Ok(())
//! });
//! conn.on(NEW_MESSAGE, on_message.clone());
//!
//! // on teardown
//! conn.off(NEW_MESSAGE, &on_message);
//! conn.disconnect();
//! ```

mod backoff;
mod connection;
mod registry;
mod ticket;
mod transport;

pub use backoff::{Backoff, ReconnectConfig};
pub use connection::LiveConnection;
pub use registry::{handler, Handler, HandlerRegistry};
pub use ticket::{HttpTicketIssuer, Ticket, TicketIssuer};
pub use transport::{
    Connector, FrameSink, FrameStream, Transport, TransportFrame, TungsteniteConnector,
};
