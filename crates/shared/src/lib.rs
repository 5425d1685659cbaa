//! Shared types for the matchwire live-update channel.

pub mod error;
pub mod events;
pub mod protocol;

pub use error::*;
pub use events::*;
pub use protocol::*;
