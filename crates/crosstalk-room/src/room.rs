//! Room: a named, mutable set of participants with guarded membership.
//!
//! Every membership read or mutation happens under the room's own mutex.
//! The guard is never held across network I/O: broadcast and forward take
//! a snapshot of the relevant members under the lock, release it, and then
//! write to each connection. A slow or dead peer can therefore delay
//! delivery, but it can never block another task's admit/remove.
//!
//! Coarse per-room locking is a deliberate choice over lock-free
//! structures: member sets are human-conversation sized and membership
//! changes are rare next to message traffic.

use std::collections::HashMap;
use std::sync::Arc;

use crosstalk_protocol::{Codec, JsonCodec, ParticipantId, PeerSummary, RoomId, SignalMessage};
use crosstalk_transport::Connection;
use tokio::sync::Mutex;

use crate::{Participant, PeerIdentity, RoomError};

/// A named group of participants sharing signaling traffic.
pub struct Room<C: Connection> {
    id: RoomId,
    members: Mutex<HashMap<ParticipantId, Arc<Participant<C>>>>,
}

impl<C: Connection> Room<C> {
    /// Creates an empty room. Only the registry calls this.
    pub(crate) fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Mutex::new(HashMap::new()),
        }
    }

    /// The room's identifier.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Admits a participant into the member set.
    ///
    /// # Errors
    /// Returns [`RoomError::DuplicateIdentity`] if a member with the same
    /// (display name, device tag) identity is already present. The
    /// existing member is left untouched; the *new* connection is the one
    /// that gets refused.
    pub async fn admit(&self, participant: Arc<Participant<C>>) -> Result<(), RoomError> {
        let mut members = self.members.lock().await;

        if members
            .values()
            .any(|m| m.identity() == participant.identity())
        {
            return Err(RoomError::DuplicateIdentity {
                room: self.id.clone(),
                username: participant.username().to_string(),
                device: participant.device().to_string(),
            });
        }

        let id = participant.id();
        members.insert(id, participant);
        tracing::info!(
            room_id = %self.id,
            participant_id = %id,
            members = members.len(),
            "participant admitted"
        );
        Ok(())
    }

    /// Removes a participant by id. Idempotent: removing an absent id is a
    /// no-op, because teardown may run after the member was already gone.
    ///
    /// Returns `true` if a member was actually removed.
    pub async fn remove(&self, id: &ParticipantId) -> bool {
        let mut members = self.members.lock().await;
        let removed = members.remove(id).is_some();
        if removed {
            tracing::info!(
                room_id = %self.id,
                participant_id = %id,
                members = members.len(),
                "participant removed"
            );
        }
        removed
    }

    /// Returns `true` if a member with this identity is currently present.
    pub async fn contains_identity(&self, identity: &PeerIdentity) -> bool {
        self.members
            .lock()
            .await
            .values()
            .any(|m| m.identity() == identity)
    }

    /// Returns the member with the given id, if present.
    pub async fn member(&self, id: &ParticipantId) -> Option<Arc<Participant<C>>> {
        self.members.lock().await.get(id).cloned()
    }

    /// Number of current members.
    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Returns `true` if the room has no members.
    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// A stable roster of current members, sorted by participant id.
    pub async fn snapshot_members(&self) -> Vec<PeerSummary> {
        let mut summaries: Vec<PeerSummary> = self
            .members
            .lock()
            .await
            .values()
            .map(|m| m.summary())
            .collect();
        summaries.sort_by_key(|s| s.user_id.0);
        summaries
    }

    /// Sends `message` to every current member except `excluding`.
    ///
    /// The message is encoded once; each recipient then gets its own
    /// write. A failed write is logged and skipped so one dead peer can't
    /// stop the rest of the room from hearing the news.
    pub async fn broadcast(
        &self,
        message: &SignalMessage,
        excluding: Option<&ParticipantId>,
    ) {
        let bytes = match JsonCodec.encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(room_id = %self.id, error = %e, "broadcast encode failed");
                return;
            }
        };

        let targets: Vec<Arc<Participant<C>>> = {
            let members = self.members.lock().await;
            members
                .values()
                .filter(|m| excluding.is_none_or(|ex| *ex != m.id()))
                .cloned()
                .collect()
        };

        for member in targets {
            if let Err(e) = member.connection().send(&bytes).await {
                tracing::warn!(
                    room_id = %self.id,
                    participant_id = %member.id(),
                    error = %e,
                    "broadcast delivery failed, skipping member"
                );
            }
        }
    }

    /// Sends a targeted message to the member named by its recipient id.
    ///
    /// Silently dropped when the message carries no recipient or the
    /// recipient is no longer a member: the target may have disconnected
    /// between message origination and delivery, and that is not the
    /// sender's problem.
    pub async fn forward(&self, message: &SignalMessage) {
        let Some(recipient) = message.recipient() else {
            tracing::debug!(
                room_id = %self.id,
                tag = message.tag(),
                "dropping targeted message without recipient"
            );
            return;
        };

        let target = { self.members.lock().await.get(&recipient).cloned() };
        let Some(target) = target else {
            tracing::debug!(
                room_id = %self.id,
                recipient = %recipient,
                tag = message.tag(),
                "recipient not present, dropping message"
            );
            return;
        };

        let bytes = match JsonCodec.encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(room_id = %self.id, error = %e, "forward encode failed");
                return;
            }
        };

        if let Err(e) = target.connection().send(&bytes).await {
            tracing::warn!(
                room_id = %self.id,
                recipient = %recipient,
                error = %e,
                "forward delivery failed"
            );
        }
    }
}
