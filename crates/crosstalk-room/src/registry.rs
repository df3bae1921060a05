//! Room registry: the single authority for the identifier → room mapping.
//!
//! The registry guard serializes every operation that can create or
//! destroy a room object: lazy creation, explicit creation, admission,
//! and reclamation. Admission goes *through* the registry rather than
//! straight to a previously resolved `Room` so that this interleaving is
//! impossible:
//!
//! 1. task A resolves room "R" (empty, about to be reclaimed),
//! 2. task B's teardown reclaims "R",
//! 3. task A admits into the orphaned object.
//!
//! Under the registry guard, step 3 re-resolves "R" and either finds the
//! still-registered object or registers a fresh one. Broadcast, forward
//! and remove never touch the registry; they only take the room's own
//! guard, so relaying stays off the registry lock entirely.
//!
//! Lock order is always registry → room, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use crosstalk_protocol::RoomId;
use crosstalk_transport::Connection;
use tokio::sync::Mutex;

use crate::{Participant, Room, RoomError};

/// Process-wide mapping from room identifier to live room.
///
/// Constructed once at startup and passed by reference into every
/// connection task; nothing in the crate reaches for it as a global.
pub struct RoomRegistry<C: Connection> {
    rooms: Mutex<HashMap<RoomId, Arc<Room<C>>>>,
}

impl<C: Connection> RoomRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the room for `id`, creating and registering an empty one
    /// if absent. The lookup-or-insert is atomic under the registry
    /// guard, so two racing callers always end up with the same object.
    pub async fn get_or_create(&self, id: &RoomId) -> Arc<Room<C>> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(id) {
            return Arc::clone(room);
        }
        let room = Arc::new(Room::new(id.clone()));
        rooms.insert(id.clone(), Arc::clone(&room));
        tracing::info!(room_id = %id, "room created");
        room
    }

    /// Explicitly creates a room, failing if the identifier is taken.
    ///
    /// Serves the out-of-band "create room" control request.
    ///
    /// # Errors
    /// Returns [`RoomError::AlreadyExists`] if the identifier is already
    /// registered.
    pub async fn create(&self, id: &RoomId) -> Result<Arc<Room<C>>, RoomError> {
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(id) {
            return Err(RoomError::AlreadyExists(id.clone()));
        }
        let room = Arc::new(Room::new(id.clone()));
        rooms.insert(id.clone(), Arc::clone(&room));
        tracing::info!(room_id = %id, "room created explicitly");
        Ok(room)
    }

    /// Returns the currently registered room for `id`, if any.
    pub async fn get(&self, id: &RoomId) -> Option<Arc<Room<C>>> {
        self.rooms.lock().await.get(id).cloned()
    }

    /// Admits a participant into the currently registered room for `id`,
    /// creating the room if needed. Returns the room the participant was
    /// admitted into.
    ///
    /// # Errors
    /// Returns [`RoomError::DuplicateIdentity`] if the room already holds
    /// a member with the same identity.
    pub async fn admit(
        &self,
        id: &RoomId,
        participant: Arc<Participant<C>>,
    ) -> Result<Arc<Room<C>>, RoomError> {
        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get(id) {
            Some(room) => Arc::clone(room),
            None => {
                let room = Arc::new(Room::new(id.clone()));
                rooms.insert(id.clone(), Arc::clone(&room));
                tracing::info!(room_id = %id, "room created");
                room
            }
        };
        room.admit(participant).await?;
        Ok(room)
    }

    /// Unregisters the room for `id` if it has no members.
    ///
    /// Called from teardown after the departing member was removed; the
    /// emptiness check runs under both guards, so a concurrent admission
    /// (which also holds the registry guard) can never lose its room.
    ///
    /// Returns `true` if the room was reclaimed.
    pub async fn reclaim_if_empty(&self, id: &RoomId) -> bool {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(id) else {
            return false;
        };
        if room.is_empty().await {
            rooms.remove(id);
            tracing::info!(room_id = %id, "empty room reclaimed");
            true
        } else {
            false
        }
    }

    /// Number of registered rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// All registered room identifiers.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().cloned().collect()
    }
}

impl<C: Connection> Default for RoomRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
