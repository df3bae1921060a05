//! Unified error type for the relay.

use crosstalk_presence::PresenceError;
use crosstalk_protocol::ProtocolError;
use crosstalk_room::{RoomError, SendError};
use crosstalk_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes generate the `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CrosstalkError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (duplicate identity, conflicting creation).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A presence-store error (config, HTTP, missing record).
    #[error(transparent)]
    Presence(#[from] PresenceError),

    /// The upgrade request was not a valid signaling connect request.
    #[error("rejected connect request: {0}")]
    Connect(String),

    /// An I/O error outside the transport (e.g. binding the control
    /// listener).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SendError<TransportError>> for CrosstalkError {
    fn from(e: SendError<TransportError>) -> Self {
        match e {
            SendError::Encode(e) => Self::Protocol(e),
            SendError::Transport(e) => Self::Transport(e),
        }
    }
}
