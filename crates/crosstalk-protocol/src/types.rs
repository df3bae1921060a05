//! Core protocol types for Crosstalk's wire format.
//!
//! This module defines every type that travels "on the wire": the structures
//! that get serialized to JSON, sent over a signaling connection, and
//! deserialized on the other side.
//!
//! The relay never interprets the negotiation payloads themselves (SDP
//! offers, ICE candidates). Those stay opaque [`serde_json::Value`] blobs;
//! only the envelope around them (type tag, room, sender, recipient) is
//! typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The `from` label stamped on relay-originated messages.
///
/// Clients distinguish "another peer said this" from "the relay said this"
/// by this sentinel.
pub const SYSTEM_SENDER: &str = "system";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for one admitted connection.
///
/// Generated fresh for every connection attempt: the same person
/// reconnecting gets a new `ParticipantId`. Identity across reconnects is
/// carried by [`PeerSummary::username`] and [`PeerSummary::device`], not by
/// this id.
///
/// Newtype over [`Uuid`] so a participant id can't be confused with a room
/// identifier in a signature. `#[serde(transparent)]` keeps the wire form a
/// plain UUID string (`"3b2e..."`), not a wrapped object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Generates a fresh random id for a new connection attempt.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A caller-supplied room identifier.
///
/// Rooms are keyed by whatever string the clients agreed on out of band;
/// the relay attaches no meaning to it beyond map-key equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room id from any string-ish value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roster entries
// ---------------------------------------------------------------------------

/// One member as seen in rosters (`existing-users`) and join notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    /// The member's connection-scoped id.
    pub user_id: ParticipantId,
    /// Caller-supplied display name.
    pub username: String,
    /// Caller-supplied device tag ("web", "mobile", ...).
    pub device: String,
}

/// The payload of a `user-left` notification.
///
/// Departures don't repeat the device tag; by the time a peer learns about
/// the departure it only needs to know which tile to drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDeparture {
    /// The departed member's connection-scoped id.
    pub user_id: ParticipantId,
    /// Display name, for UI labels on the leave toast.
    pub username: String,
}

/// The payload of the one-time `welcome` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeInfo {
    /// The id the relay assigned to this connection.
    pub user_id: ParticipantId,
    /// The room the connection was resolved into.
    pub room_id: RoomId,
}

// ---------------------------------------------------------------------------
// Relay envelope (offer / answer / ice-candidate)
// ---------------------------------------------------------------------------

/// The addressed envelope shared by all peer-to-peer negotiation messages.
///
/// `offer`, `answer` and `ice-candidate` differ only in their type tag; the
/// body is always "from X, to Y, carrying this opaque blob". The relay
/// overwrites `from` with the authenticated sender's id before forwarding
/// (a client-supplied `from` is never trusted) and routes on `to`.
///
/// All fields except `content` are optional on the wire and omitted when
/// absent, matching clients that leave `roomId` implicit because the
/// connection itself is room-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relay {
    /// Room scope, if the client chose to repeat it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Sender label. Stamped by the relay on forwarded messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient id. Required for the message to be deliverable; a relay
    /// message without one is dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ParticipantId>,
    /// Opaque negotiation payload (SDP, ICE candidate, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}

// ---------------------------------------------------------------------------
// SignalMessage: the tagged union of everything on the wire
// ---------------------------------------------------------------------------

/// Every message a signaling connection can carry, in either direction.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, so an offer
/// looks like:
///
/// ```json
/// { "type": "offer", "from": "...", "to": "...", "content": { ... } }
/// ```
///
/// `rename_all = "kebab-case"` maps variant names to the wire tags
/// (`IceCandidate` becomes `"ice-candidate"`), and `rename_all_fields`
/// keeps struct-variant fields camelCase to match the rest of the wire.
///
/// The [`SignalMessage::Unknown`] catch-all absorbs any well-formed message
/// whose tag this build doesn't recognize. Unknown tags are ignored rather
/// than treated as protocol violations, so old relays keep working when
/// clients grow new message types. Malformed JSON still fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalMessage {
    // -- Peer-to-peer negotiation (client → relay → one peer) --
    /// An SDP offer addressed to one peer.
    Offer(Relay),

    /// An SDP answer addressed to one peer.
    Answer(Relay),

    /// An ICE candidate addressed to one peer.
    IceCandidate(Relay),

    // -- Client requests (client → relay, answered directly) --
    /// Ask the relay for the room's current roster.
    GetUsers {
        /// Room scope, tolerated but ignored: the connection is already
        /// bound to exactly one room.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },

    /// Application-level liveness ping from the client.
    KeepAlive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    // -- Relay notifications (relay → client) --
    /// First message on every connection: the assigned participant id.
    Welcome { from: String, content: WelcomeInfo },

    /// Roster of other live members. Sent once after `welcome` (when the
    /// room isn't empty) and again on every `get-users` request.
    ExistingUsers {
        from: String,
        content: Vec<PeerSummary>,
    },

    /// Another member was admitted into the room.
    UserJoined { from: String, content: PeerSummary },

    /// A member left the room (clean close and liveness death alike).
    UserLeft { from: String, content: PeerDeparture },

    /// Direct reply to a `keep-alive`.
    KeepAliveAck { from: String },

    /// Any well-formed message with an unrecognized tag.
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    /// Builds the `welcome` message for a freshly assigned participant.
    pub fn welcome(user_id: ParticipantId, room_id: RoomId) -> Self {
        Self::Welcome {
            from: SYSTEM_SENDER.to_string(),
            content: WelcomeInfo { user_id, room_id },
        }
    }

    /// Builds an `existing-users` roster message.
    pub fn existing_users(peers: Vec<PeerSummary>) -> Self {
        Self::ExistingUsers {
            from: SYSTEM_SENDER.to_string(),
            content: peers,
        }
    }

    /// Builds the `user-joined` notification for a new member.
    ///
    /// `from` carries the display name so clients can render the toast
    /// without a roster lookup.
    pub fn user_joined(peer: PeerSummary) -> Self {
        Self::UserJoined {
            from: peer.username.clone(),
            content: peer,
        }
    }

    /// Builds the `user-left` notification for a departed member.
    pub fn user_left(user_id: ParticipantId, username: String) -> Self {
        Self::UserLeft {
            from: username.clone(),
            content: PeerDeparture { user_id, username },
        }
    }

    /// Builds the direct acknowledgment for a `keep-alive`.
    pub fn keep_alive_ack() -> Self {
        Self::KeepAliveAck {
            from: SYSTEM_SENDER.to_string(),
        }
    }

    /// The recipient a targeted message is addressed to.
    ///
    /// Only the peer-to-peer negotiation messages are targeted; everything
    /// else returns `None`.
    pub fn recipient(&self) -> Option<ParticipantId> {
        match self {
            Self::Offer(relay) | Self::Answer(relay) | Self::IceCandidate(relay) => relay.to,
            _ => None,
        }
    }

    /// The wire tag of this message, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::GetUsers { .. } => "get-users",
            Self::KeepAlive { .. } => "keep-alive",
            Self::Welcome { .. } => "welcome",
            Self::ExistingUsers { .. } => "existing-users",
            Self::UserJoined { .. } => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::KeepAliveAck { .. } => "keep-alive-ack",
            Self::Unknown => "unknown",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
