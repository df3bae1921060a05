//! The presence store contract and its record type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crosstalk_protocol::{ParticipantId, PeerSummary, RoomId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PresenceError;

/// One durable membership record, as stored in the `room_users` table.
///
/// Records are soft-deleted: leaving a room flips `is_active` off instead
/// of deleting the row, so join history survives. Consumers of rosters
/// must treat `is_active` as advisory; a relay that crashed without
/// cleanup leaves active records behind, which is why live rosters are
/// always intersected with the in-memory member set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Row id.
    pub id: Uuid,
    /// Room the record belongs to.
    pub room_id: RoomId,
    /// The participant id the connection was assigned.
    pub user_id: ParticipantId,
    /// Display name at join time.
    pub username: String,
    /// Device tag at join time.
    pub device: String,
    /// Whether the user is currently (believed to be) connected.
    pub is_active: bool,
    /// Id of the live connection backing this record, if any.
    #[serde(default)]
    pub connection_id: Option<Uuid>,
    /// When the record was first created.
    pub joined_at: DateTime<Utc>,
    /// Last time the relay confirmed the user was alive.
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    /// This record as a roster entry.
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            user_id: self.user_id,
            username: self.username.clone(),
            device: self.device.clone(),
        }
    }
}

/// The external presence service, as the relay sees it.
///
/// A trait at the collaborator seam: production uses the HTTP client
/// against the real store, tests and local development use the in-memory
/// implementation. The methods are declared in desugared form so their
/// futures are `Send`; presence calls happen inside spawned connection
/// tasks that are generic over the store.
///
/// The store is remote and has its own consistency guarantees;
/// read-after-write is NOT assumed. Callers must tolerate a `list` that
/// is momentarily stale relative to an immediately preceding write.
pub trait PresenceStore: Send + Sync + 'static {
    /// Records that `user` joined `room`, reusing and reactivating an
    /// existing inactive record for the same room+user if one exists.
    /// An already-active record is left untouched.
    fn add_or_reactivate(
        &self,
        room: &RoomId,
        user: ParticipantId,
        username: &str,
        device: &str,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;

    /// Returns the active records for `room`.
    fn list(
        &self,
        room: &RoomId,
    ) -> impl Future<Output = Result<Vec<PresenceRecord>, PresenceError>> + Send;

    /// Stamps `last_seen` for `user` in `room`, bounding the staleness of
    /// the durable record.
    fn touch(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;

    /// Deactivates the record for `user` in `room` (soft delete).
    fn remove(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send;
}

/// Stores are commonly shared across connection tasks behind an `Arc`;
/// delegate so an `Arc<impl PresenceStore>` is itself a store.
impl<P: PresenceStore> PresenceStore for Arc<P> {
    fn add_or_reactivate(
        &self,
        room: &RoomId,
        user: ParticipantId,
        username: &str,
        device: &str,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send {
        self.as_ref().add_or_reactivate(room, user, username, device)
    }

    fn list(
        &self,
        room: &RoomId,
    ) -> impl Future<Output = Result<Vec<PresenceRecord>, PresenceError>> + Send {
        self.as_ref().list(room)
    }

    fn touch(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send {
        self.as_ref().touch(room, user)
    }

    fn remove(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> impl Future<Output = Result<(), PresenceError>> + Send {
        self.as_ref().remove(room, user)
    }
}
