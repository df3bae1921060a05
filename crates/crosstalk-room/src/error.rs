//! Error types for the room layer.

use crosstalk_protocol::{ProtocolError, RoomId};

/// Errors that can occur during room and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Explicit creation was requested for an identifier that is already
    /// registered.
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    /// A member with the same identity is already present in the room.
    ///
    /// Identity here is the (display name, device tag) pair, not the
    /// connection id: a reconnect race must not produce two live entries
    /// for one logical user endpoint.
    #[error("identity {username}@{device} already present in room {room}")]
    DuplicateIdentity {
        room: RoomId,
        username: String,
        device: String,
    },
}

/// Errors from sending a message to a single participant.
///
/// Generic over the connection's own error type so mock transports in
/// tests surface their errors unchanged.
#[derive(Debug, thiserror::Error)]
pub enum SendError<E: std::error::Error> {
    /// The message could not be encoded.
    #[error("message encode failed: {0}")]
    Encode(#[from] ProtocolError),

    /// The transport rejected the write.
    #[error("transport send failed: {0}")]
    Transport(E),
}
