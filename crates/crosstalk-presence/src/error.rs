//! Error types for the presence layer.

use crosstalk_protocol::{ParticipantId, RoomId};

/// Errors that can occur talking to the presence store.
///
/// During steady-state operation these are logged and absorbed (a roster
/// query that fails yields an empty roster); only at admission time does a
/// presence failure abort anything.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// A required environment variable is not set. Fatal at startup.
    #[error("missing presence configuration: {0} is not set")]
    MissingConfig(&'static str),

    /// Configuration was present but unusable (e.g. a key that can't be
    /// sent as an HTTP header).
    #[error("invalid presence configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP request itself failed (connect, timeout, decode).
    #[error("presence request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("presence service returned {status}: {body}")]
    Service { status: u16, body: String },

    /// An update targeted a record that does not exist.
    #[error("no presence record for user {user} in room {room}")]
    NotFound { room: RoomId, user: ParticipantId },
}
