//! Event types pushed by the matchmaking API.

/// A recruitment filled up and a room was created for its members.
pub const MATCH_CREATED: &str = "match_created";

/// A recruitment changed (joined, left, closed).
pub const RECRUITMENT_UPDATE: &str = "recruitment_update";

/// A chat message was posted in a room.
pub const NEW_MESSAGE: &str = "new_message";

/// A room was closed.
pub const ROOM_CLOSED: &str = "room_closed";

/// A member asked to close a room.
pub const CLOSE_REQUESTED: &str = "close_requested";

/// Every event type the server currently emits.
pub const KNOWN_EVENTS: &[&str] = &[
    MATCH_CREATED,
    RECRUITMENT_UPDATE,
    NEW_MESSAGE,
    ROOM_CLOSED,
    CLOSE_REQUESTED,
];
