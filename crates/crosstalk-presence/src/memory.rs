//! In-memory presence store for tests and local development.
//!
//! Implements the same semantics as the hosted store, reactivation and
//! soft deletes included, so the admission and roster paths behave
//! identically whether or not a real store is reachable.

use std::collections::HashMap;

use chrono::Utc;
use crosstalk_protocol::{ParticipantId, RoomId};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{PresenceError, PresenceRecord, PresenceStore};

/// A [`PresenceStore`] that keeps records in a process-local map.
#[derive(Default)]
pub struct MemoryPresence {
    records: Mutex<HashMap<(RoomId, ParticipantId), PresenceRecord>>,
}

impl MemoryPresence {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plants a record directly, bypassing the join flow.
    ///
    /// Lets tests simulate leftovers from a crashed relay: records that
    /// are still active in the store but have no live connection.
    pub async fn seed(&self, record: PresenceRecord) {
        self.records
            .lock()
            .await
            .insert((record.room_id.clone(), record.user_id), record);
    }

    /// Returns the record for one room+user pair, active or not.
    pub async fn record(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> Option<PresenceRecord> {
        self.records.lock().await.get(&(room.clone(), user)).cloned()
    }
}

impl PresenceStore for MemoryPresence {
    async fn add_or_reactivate(
        &self,
        room: &RoomId,
        user: ParticipantId,
        username: &str,
        device: &str,
    ) -> Result<(), PresenceError> {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        match records.get_mut(&(room.clone(), user)) {
            Some(existing) if existing.is_active => Ok(()),
            Some(existing) => {
                existing.is_active = true;
                existing.connection_id = Some(Uuid::new_v4());
                existing.last_seen = now;
                Ok(())
            }
            None => {
                records.insert(
                    (room.clone(), user),
                    PresenceRecord {
                        id: Uuid::new_v4(),
                        room_id: room.clone(),
                        user_id: user,
                        username: username.to_string(),
                        device: device.to_string(),
                        is_active: true,
                        connection_id: Some(Uuid::new_v4()),
                        joined_at: now,
                        last_seen: now,
                    },
                );
                Ok(())
            }
        }
    }

    async fn list(&self, room: &RoomId) -> Result<Vec<PresenceRecord>, PresenceError> {
        let records = self.records.lock().await;
        let mut rows: Vec<PresenceRecord> = records
            .values()
            .filter(|r| r.room_id == *room && r.is_active)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.user_id.0);
        Ok(rows)
    }

    async fn touch(&self, room: &RoomId, user: ParticipantId) -> Result<(), PresenceError> {
        let mut records = self.records.lock().await;
        match records.get_mut(&(room.clone(), user)) {
            Some(record) => {
                record.last_seen = Utc::now();
                Ok(())
            }
            None => Err(PresenceError::NotFound {
                room: room.clone(),
                user,
            }),
        }
    }

    async fn remove(&self, room: &RoomId, user: ParticipantId) -> Result<(), PresenceError> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&(room.clone(), user)) {
            record.is_active = false;
            record.connection_id = None;
            record.last_seen = Utc::now();
        }
        // Removing an unknown record is a no-op: teardown must be safe to
        // run even when registration never completed.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid() -> ParticipantId {
        ParticipantId::generate()
    }

    #[tokio::test]
    async fn test_add_then_list_returns_active_record() {
        let store = MemoryPresence::new();
        let room = RoomId::new("R1");
        let user = pid();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();

        let rows = store.list(&room).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, user);
        assert_eq!(rows[0].username, "alice");
        assert!(rows[0].is_active);
        assert!(rows[0].connection_id.is_some());
    }

    #[tokio::test]
    async fn test_add_while_active_is_noop() {
        let store = MemoryPresence::new();
        let room = RoomId::new("R1");
        let user = pid();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();
        let first = store.record(&room, user).await.unwrap();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();
        let second = store.record(&room, user).await.unwrap();

        assert_eq!(first, second, "active record left untouched");
        assert_eq!(store.list(&room).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_readd_reactivates_inactive_record() {
        let store = MemoryPresence::new();
        let room = RoomId::new("R1");
        let user = pid();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();
        let original = store.record(&room, user).await.unwrap();
        store.remove(&room, user).await.unwrap();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();
        let revived = store.record(&room, user).await.unwrap();

        assert_eq!(revived.id, original.id, "row is reused, not duplicated");
        assert!(revived.is_active);
        assert!(revived.connection_id.is_some());
        assert_ne!(
            revived.connection_id, original.connection_id,
            "reactivation issues a fresh connection id"
        );
    }

    #[tokio::test]
    async fn test_list_excludes_inactive_and_other_rooms() {
        let store = MemoryPresence::new();
        let r1 = RoomId::new("R1");
        let r2 = RoomId::new("R2");
        let stays = pid();
        let leaves = pid();
        let elsewhere = pid();

        store.add_or_reactivate(&r1, stays, "alice", "web").await.unwrap();
        store.add_or_reactivate(&r1, leaves, "bob", "web").await.unwrap();
        store
            .add_or_reactivate(&r2, elsewhere, "carol", "web")
            .await
            .unwrap();
        store.remove(&r1, leaves).await.unwrap();

        let rows = store.list(&r1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, stays);
    }

    #[tokio::test]
    async fn test_touch_updates_last_seen() {
        let store = MemoryPresence::new();
        let room = RoomId::new("R1");
        let user = pid();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();
        let before = store.record(&room, user).await.unwrap().last_seen;

        store.touch(&room, user).await.unwrap();
        let after = store.record(&room, user).await.unwrap().last_seen;

        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_touch_unknown_record_is_not_found() {
        let store = MemoryPresence::new();
        let result = store.touch(&RoomId::new("R1"), pid()).await;
        assert!(matches!(result, Err(PresenceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_soft_deletes() {
        let store = MemoryPresence::new();
        let room = RoomId::new("R1");
        let user = pid();

        store
            .add_or_reactivate(&room, user, "alice", "web")
            .await
            .unwrap();
        store.remove(&room, user).await.unwrap();

        // Gone from rosters, but the record survives.
        assert!(store.list(&room).await.unwrap().is_empty());
        let record = store.record(&room, user).await.unwrap();
        assert!(!record.is_active);
        assert!(record.connection_id.is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_record_is_ok() {
        let store = MemoryPresence::new();
        store.remove(&RoomId::new("R1"), pid()).await.unwrap();
    }
}
