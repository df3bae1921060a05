//! Wire protocol for Crosstalk.
//!
//! This crate defines the "language" that signaling clients and the relay
//! speak:
//!
//! - **Types** ([`SignalMessage`], [`Relay`], [`PeerSummary`], the id
//!   newtypes) — the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the room
//! layer (membership). It doesn't know about connections or rooms; it only
//! knows how to name them and how to serialize messages about them.
//!
//! ```text
//! Transport (frames) → Protocol (SignalMessage) → Room (membership)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ParticipantId, PeerDeparture, PeerSummary, Relay, RoomId, SYSTEM_SENDER, SignalMessage,
    WelcomeInfo,
};
