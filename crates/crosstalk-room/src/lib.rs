//! Room membership and participant lifecycle for Crosstalk.
//!
//! This crate is the relay's concurrency core: the shared mutable state
//! (who is in which room) and the two guarded surfaces that every
//! connection task goes through to touch it.
//!
//! # Key types
//!
//! - [`Participant`] — one admitted connection bound to an identity
//! - [`PeerIdentity`] — the (display name, device tag) pair used for the
//!   duplicate-membership check
//! - [`Room`] — guarded member set with broadcast and targeted forward
//! - [`RoomRegistry`] — the single authority for identifier → room
//!
//! # Concurrency model
//!
//! Two mutexes, strictly ordered (registry before room, when both are
//! held): the registry guard serializes room creation, admission and
//! reclamation; each room's guard serializes membership access. Neither
//! guard is ever held across a network write; sends go to a membership
//! snapshot taken under the room guard.

mod error;
mod participant;
mod registry;
mod room;

pub use error::{RoomError, SendError};
pub use participant::{Participant, PeerIdentity};
pub use registry::RoomRegistry;
pub use room::Room;
