//! Message router: classifies inbound messages and dispatches them.
//!
//! Runs on the connection's single receive-loop task; there is no
//! concurrency inside the router itself. The dispatch table:
//!
//! | tag | behavior |
//! |---|---|
//! | `offer` / `answer` / `ice-candidate` | stamp sender id, forward to the addressed member |
//! | `get-users` | durable roster ∩ live members, minus the requester, replied directly |
//! | `keep-alive` | direct `keep-alive-ack` |
//! | anything else | ignored |

use std::collections::HashSet;
use std::sync::Arc;

use crosstalk_presence::{PresenceRecord, PresenceStore};
use crosstalk_protocol::{ParticipantId, PeerSummary, Relay, SignalMessage};
use crosstalk_room::{Participant, Room};

use crate::server::SignalConnection;

/// Handles one inbound message from `participant`.
pub(crate) async fn dispatch<P: PresenceStore>(
    message: SignalMessage,
    participant: &Arc<Participant<SignalConnection>>,
    room: &Arc<Room<SignalConnection>>,
    presence: &P,
) {
    let tag = message.tag();
    match message {
        // Negotiation traffic: overwrite the sender label with the
        // authenticated connection's id (a client-supplied `from` is
        // never trusted), then route on the recipient id.
        SignalMessage::Offer(relay) => {
            room.forward(&SignalMessage::Offer(stamp(relay, participant)))
                .await;
        }
        SignalMessage::Answer(relay) => {
            room.forward(&SignalMessage::Answer(stamp(relay, participant)))
                .await;
        }
        SignalMessage::IceCandidate(relay) => {
            room.forward(&SignalMessage::IceCandidate(stamp(relay, participant)))
                .await;
        }

        SignalMessage::GetUsers { .. } => {
            // A store failure yields an empty roster rather than an error
            // surfaced to the peer: the request always completes.
            let roster = match presence.list(room.id()).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(
                        room_id = %room.id(),
                        error = %e,
                        "roster query failed, replying with empty roster"
                    );
                    Vec::new()
                }
            };
            let live = room.snapshot_members().await;
            let peers = filter_roster(&roster, &live, participant.id());
            if let Err(e) = participant
                .send(&SignalMessage::existing_users(peers))
                .await
            {
                tracing::warn!(
                    participant_id = %participant.id(),
                    error = %e,
                    "roster reply failed"
                );
            }
        }

        SignalMessage::KeepAlive { .. } => {
            if let Err(e) = participant.send(&SignalMessage::keep_alive_ack()).await {
                tracing::warn!(
                    participant_id = %participant.id(),
                    error = %e,
                    "keep-alive ack failed"
                );
            }
        }

        // Relay-originated tags arriving from a client, and tags this
        // build doesn't know: ignored without a reply, for forward
        // compatibility.
        SignalMessage::Welcome { .. }
        | SignalMessage::ExistingUsers { .. }
        | SignalMessage::UserJoined { .. }
        | SignalMessage::UserLeft { .. }
        | SignalMessage::KeepAliveAck { .. }
        | SignalMessage::Unknown => {
            tracing::debug!(
                participant_id = %participant.id(),
                tag,
                "ignoring unroutable message"
            );
        }
    }
}

fn stamp(mut relay: Relay, participant: &Participant<SignalConnection>) -> Relay {
    relay.from = Some(participant.id().to_string());
    relay
}

/// Intersects the durable roster with the live member set.
///
/// The store may list users whose relay died before cleanup; only ids
/// with a live connection make it into a roster reply, and the requester
/// never sees itself. Order is stable (sorted by participant id).
pub(crate) fn filter_roster(
    roster: &[PresenceRecord],
    live: &[PeerSummary],
    requester: ParticipantId,
) -> Vec<PeerSummary> {
    let live_ids: HashSet<ParticipantId> = live.iter().map(|s| s.user_id).collect();
    let mut peers: Vec<PeerSummary> = roster
        .iter()
        .filter(|r| r.user_id != requester && live_ids.contains(&r.user_id))
        .map(|r| r.summary())
        .collect();
    peers.sort_by_key(|p| p.user_id.0);
    peers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crosstalk_protocol::RoomId;
    use uuid::Uuid;

    fn record(user_id: ParticipantId, username: &str) -> PresenceRecord {
        let now = Utc::now();
        PresenceRecord {
            id: Uuid::new_v4(),
            room_id: RoomId::new("R1"),
            user_id,
            username: username.to_string(),
            device: "web".to_string(),
            is_active: true,
            connection_id: Some(Uuid::new_v4()),
            joined_at: now,
            last_seen: now,
        }
    }

    fn summary(user_id: ParticipantId, username: &str) -> PeerSummary {
        PeerSummary {
            user_id,
            username: username.to_string(),
            device: "web".to_string(),
        }
    }

    #[test]
    fn test_filter_roster_excludes_requester() {
        let me = ParticipantId::generate();
        let other = ParticipantId::generate();
        let roster = vec![record(me, "me"), record(other, "other")];
        let live = vec![summary(me, "me"), summary(other, "other")];

        let peers = filter_roster(&roster, &live, me);

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user_id, other);
    }

    #[test]
    fn test_filter_roster_excludes_stale_store_entries() {
        // The store still lists a user whose relay crashed; no live
        // connection, so the roster must not include them.
        let me = ParticipantId::generate();
        let live_peer = ParticipantId::generate();
        let ghost = ParticipantId::generate();
        let roster = vec![
            record(live_peer, "alice"),
            record(ghost, "ghost"),
        ];
        let live = vec![summary(me, "me"), summary(live_peer, "alice")];

        let peers = filter_roster(&roster, &live, me);

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user_id, live_peer);
    }

    #[test]
    fn test_filter_roster_empty_store_gives_empty_reply() {
        let me = ParticipantId::generate();
        let live = vec![summary(me, "me")];
        assert!(filter_roster(&[], &live, me).is_empty());
    }

    #[test]
    fn test_filter_roster_sorted_by_participant_id() {
        let me = ParticipantId::generate();
        let a = ParticipantId::generate();
        let b = ParticipantId::generate();
        let roster = vec![record(a, "a"), record(b, "b")];
        let live = vec![summary(a, "a"), summary(b, "b")];

        let peers = filter_roster(&roster, &live, me);

        assert_eq!(peers.len(), 2);
        assert!(peers[0].user_id.0 <= peers[1].user_id.0);
    }
}
