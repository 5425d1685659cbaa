//! Matchwire client - live updates for the matchmaking web app
//!
//! This crate contains the real-time connection manager and the fallback
//! polling scheduler used by the matchmaking client.

pub mod api_client;
pub mod config;
pub mod logging;
pub mod polling;
pub mod ws;

pub use api_client::ApiClient;
pub use config::{ClientConfig, ConnectionConfig};
pub use polling::Poller;
pub use ws::{handler, Handler, LiveConnection};
