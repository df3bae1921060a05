//! Participant: one admitted connection bound to an identity.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crosstalk_liveness::LivenessMonitor;
use crosstalk_protocol::{Codec, JsonCodec, ParticipantId, PeerSummary, RoomId, SignalMessage};
use crosstalk_transport::Connection;

use crate::SendError;

/// The caller-supplied identity of one logical user endpoint.
///
/// The duplicate-membership check keys on this pair, not on the generated
/// participant id: a fresh connection attempt always carries a fresh id,
/// so the id can never detect "this user is already here". The same
/// display name on two different devices counts as two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    /// Display name, as given in the connect request.
    pub username: String,
    /// Device tag, as given in the connect request.
    pub device: String,
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.device)
    }
}

/// One admitted connection: identity, room back-reference, connection
/// handle, and liveness record.
///
/// The room back-reference is the *identifier*, not the `Room` object.
/// Teardown resolves the identifier through the registry at the moment it
/// runs, so a participant can never pin a reclaimed room object alive or
/// mutate one that is no longer registered.
pub struct Participant<C: Connection> {
    id: ParticipantId,
    identity: PeerIdentity,
    room_id: RoomId,
    connection: Arc<C>,
    liveness: LivenessMonitor,
    torn_down: AtomicBool,
}

impl<C: Connection> Participant<C> {
    /// Creates a participant for a connection that is being admitted.
    pub fn new(
        id: ParticipantId,
        identity: PeerIdentity,
        room_id: RoomId,
        connection: Arc<C>,
    ) -> Self {
        Self {
            id,
            identity,
            room_id,
            connection,
            liveness: LivenessMonitor::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// The connection-scoped id assigned at admission.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// The (display name, device tag) identity pair.
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    /// The display name.
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// The device tag.
    pub fn device(&self) -> &str {
        &self.identity.device
    }

    /// The identifier of the room this participant belongs to.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The underlying connection handle.
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// The liveness record shared by the receive loop and the probe loop.
    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// This participant as a roster entry.
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            user_id: self.id,
            username: self.identity.username.clone(),
            device: self.identity.device.clone(),
        }
    }

    /// Encodes and sends one message to this participant.
    pub async fn send(&self, message: &SignalMessage) -> Result<(), SendError<C::Error>> {
        let bytes = JsonCodec.encode(message)?;
        self.connection
            .send(&bytes)
            .await
            .map_err(SendError::Transport)
    }

    /// Claims the right to run teardown.
    ///
    /// Returns `true` exactly once, for the first caller; every exit path
    /// (peer close, decode error, transport failure, probe death) races
    /// through here and only the winner performs cleanup.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` once teardown has been claimed.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_identity_equality_is_name_and_device() {
        let a = PeerIdentity {
            username: "alice".into(),
            device: "web".into(),
        };
        let b = PeerIdentity {
            username: "alice".into(),
            device: "web".into(),
        };
        let c = PeerIdentity {
            username: "alice".into(),
            device: "mobile".into(),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_peer_identity_display() {
        let id = PeerIdentity {
            username: "alice".into(),
            device: "web".into(),
        };
        assert_eq!(id.to_string(), "alice@web");
    }
}
