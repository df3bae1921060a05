//! Per-connection handler: admission, receive loop, and exit paths.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Read connect parameters (room, username, device) from the
//!      upgrade request query string
//!   2. Fast duplicate-identity check against the live member set
//!   3. Register with the presence service, fetch the durable roster
//!   4. Emit `welcome`, then `existing-users` if other members are live
//!   5. Admit into the room (authoritative duplicate check), broadcast
//!      `user-joined`
//!   6. Spawn the probe and presence-touch timers
//!   7. Loop: receive frames, hand them to the router
//!   8. Tear down, exactly once, whatever ended the loop

use std::sync::Arc;

use crosstalk_liveness::{ProbeOutcome, run_probe_loop};
use crosstalk_presence::PresenceStore;
use crosstalk_protocol::{Codec, JsonCodec, ParticipantId, RoomId, SignalMessage};
use crosstalk_room::{Participant, PeerIdentity, Room, RoomError};
use crosstalk_transport::{ConnectRequest, Connection, Inbound};

use crate::CrosstalkError;
use crate::router;
use crate::server::{ServerState, SignalConnection};
use crate::teardown::{Teardown, TeardownGuard};

/// The only path signaling connections are served on.
pub(crate) const SIGNAL_PATH: &str = "/ws/voicechat";

/// Parameters a signaling client supplies in its upgrade request.
pub(crate) struct ConnectParams {
    pub(crate) room_id: RoomId,
    pub(crate) username: String,
    pub(crate) device: String,
}

impl ConnectParams {
    /// Extracts and validates connect parameters from the upgrade
    /// request. All three parameters are required and non-empty.
    pub(crate) fn from_request(request: &ConnectRequest) -> Result<Self, String> {
        if request.path != SIGNAL_PATH {
            return Err(format!("unknown path {}", request.path));
        }

        let mut room_id = None;
        let mut username = None;
        let mut device = None;
        for pair in request.query.as_deref().unwrap_or("").split('&') {
            let mut parts = pair.splitn(2, '=');
            let Some(key) = parts.next() else { continue };
            let value = parts.next().unwrap_or("");
            let Ok(key) = urlencoding::decode(key) else {
                continue;
            };
            let Ok(value) = urlencoding::decode(value) else {
                continue;
            };
            match key.as_ref() {
                "roomId" => room_id = Some(value.into_owned()),
                "username" => username = Some(value.into_owned()),
                "device" => device = Some(value.into_owned()),
                _ => {}
            }
        }

        let room_id = room_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "missing roomId".to_string())?;
        let username = username
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "missing username".to_string())?;
        let device = device
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "missing device".to_string())?;

        Ok(Self {
            room_id: RoomId::new(room_id),
            username,
            device,
        })
    }
}

/// Handles a single connection from accept to teardown.
pub(crate) async fn handle_connection<P: PresenceStore>(
    conn: SignalConnection,
    request: ConnectRequest,
    state: Arc<ServerState<P>>,
) -> Result<(), CrosstalkError> {
    let conn_id = conn.id();

    let params = match ConnectParams::from_request(&request) {
        Ok(params) => params,
        Err(reason) => {
            tracing::warn!(%conn_id, %reason, "rejecting connect request");
            let _ = conn.close().await;
            return Err(CrosstalkError::Connect(reason));
        }
    };

    let conn = Arc::new(conn);
    let participant_id = ParticipantId::generate();
    let identity = PeerIdentity {
        username: params.username.clone(),
        device: params.device.clone(),
    };
    tracing::debug!(
        %conn_id,
        room_id = %params.room_id,
        identity = %identity,
        %participant_id,
        "connection requesting admission"
    );

    // Fast duplicate check before any presence traffic. Room::admit
    // re-checks under the registry guard; this one only fails fast.
    let room = state.registry.get_or_create(&params.room_id).await;
    if room.contains_identity(&identity).await {
        tracing::info!(
            room_id = %params.room_id,
            identity = %identity,
            "identity already present, refusing connection"
        );
        let _ = conn.close().await;
        return Err(RoomError::DuplicateIdentity {
            room: params.room_id,
            username: identity.username,
            device: identity.device,
        }
        .into());
    }
    drop(room);

    // Registration with the presence service gates admission.
    if let Err(e) = state
        .presence
        .add_or_reactivate(
            &params.room_id,
            participant_id,
            &params.username,
            &params.device,
        )
        .await
    {
        tracing::error!(
            room_id = %params.room_id,
            %participant_id,
            error = %e,
            "presence registration failed, aborting admission"
        );
        let _ = conn.close().await;
        return Err(e.into());
    }

    // Durable roster, fetched before admission so the joiner's own
    // record is the only one that can name them.
    let roster = match state.presence.list(&params.room_id).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(
                room_id = %params.room_id,
                %participant_id,
                error = %e,
                "roster query failed, aborting admission"
            );
            abort_admission(&state, &params.room_id, participant_id, &conn).await;
            return Err(e.into());
        }
    };

    let participant = Arc::new(Participant::new(
        participant_id,
        identity,
        params.room_id.clone(),
        Arc::clone(&conn),
    ));

    // (1) welcome with the assigned id, (2) the pre-filtered roster if
    // any other members are live. Both go out before admission, so the
    // joiner never sees its own user-joined.
    if let Err(e) = participant
        .send(&SignalMessage::welcome(participant_id, params.room_id.clone()))
        .await
    {
        tracing::debug!(%participant_id, error = %e, "welcome delivery failed");
        abort_admission(&state, &params.room_id, participant_id, &conn).await;
        return Err(e.into());
    }

    let live = match state.registry.get(&params.room_id).await {
        Some(room) => room.snapshot_members().await,
        None => Vec::new(),
    };
    let peers = router::filter_roster(&roster, &live, participant_id);
    if !peers.is_empty() {
        if let Err(e) = participant.send(&SignalMessage::existing_users(peers)).await {
            tracing::debug!(%participant_id, error = %e, "roster delivery failed");
            abort_admission(&state, &params.room_id, participant_id, &conn).await;
            return Err(e.into());
        }
    }

    // Authoritative admission, serialized through the registry guard.
    let room = match state
        .registry
        .admit(&params.room_id, Arc::clone(&participant))
        .await
    {
        Ok(room) => room,
        Err(e) => {
            tracing::info!(
                room_id = %params.room_id,
                %participant_id,
                error = %e,
                "admission refused"
            );
            abort_admission(&state, &params.room_id, participant_id, &conn).await;
            return Err(e.into());
        }
    };

    room.broadcast(
        &SignalMessage::user_joined(participant.summary()),
        Some(&participant_id),
    )
    .await;

    // From here on, every exit goes through the shared teardown.
    let teardown = Arc::new(Teardown::new(
        Arc::clone(&state),
        Arc::clone(&participant),
        Arc::clone(&room),
    ));
    let _guard = TeardownGuard::new(Arc::clone(&teardown));

    // Probe loop: detects dead transports by write failure.
    let probe = tokio::spawn({
        let conn = Arc::clone(&conn);
        let participant = Arc::clone(&participant);
        let config = state.liveness.clone();
        let teardown = Arc::clone(&teardown);
        async move {
            let outcome = run_probe_loop(conn.as_ref(), participant.liveness(), &config).await;
            if outcome != ProbeOutcome::Superseded {
                tracing::info!(
                    participant_id = %participant.id(),
                    ?outcome,
                    "probe loop declared connection dead"
                );
                // Detached: aborting the probe task must not be able to
                // truncate the cleanup it initiated.
                tokio::spawn(async move { teardown.run().await });
            }
        }
    });

    // Touch loop: keeps the durable presence record from going stale.
    let touch = tokio::spawn({
        let state = Arc::clone(&state);
        let room_id = params.room_id.clone();
        async move {
            let mut ticker = tokio::time::interval(state.liveness.touch_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = state.presence.touch(&room_id, participant_id).await {
                    tracing::warn!(
                        room_id = %room_id,
                        %participant_id,
                        error = %e,
                        "presence touch failed"
                    );
                }
            }
        }
    });
    teardown.track(probe).await;
    teardown.track(touch).await;

    let result = receive_loop(&conn, &participant, &room, &state).await;
    teardown.run().await;
    result
}

/// The connection's receive loop: the exclusive reader of this stream.
async fn receive_loop<P: PresenceStore>(
    conn: &Arc<SignalConnection>,
    participant: &Arc<Participant<SignalConnection>>,
    room: &Arc<Room<SignalConnection>>,
    state: &Arc<ServerState<P>>,
) -> Result<(), CrosstalkError> {
    loop {
        match conn.recv().await {
            Ok(Some(Inbound::Data(data))) => {
                // Any inbound traffic resets liveness.
                participant.liveness().record_activity();
                let message: SignalMessage = match JsonCodec.decode(&data) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(
                            participant_id = %participant.id(),
                            error = %e,
                            "malformed frame, closing connection"
                        );
                        return Err(e.into());
                    }
                };
                tracing::debug!(
                    participant_id = %participant.id(),
                    tag = message.tag(),
                    "message received"
                );
                router::dispatch(message, participant, room, &state.presence).await;
            }
            Ok(Some(Inbound::Ack)) => {
                participant.liveness().record_activity();
            }
            Ok(None) => {
                tracing::info!(
                    participant_id = %participant.id(),
                    "connection closed by peer"
                );
                return Ok(());
            }
            Err(e) => {
                // Let a concurrently running probe loop know this death
                // is already being handled.
                participant.liveness().mark_dead();
                tracing::debug!(
                    participant_id = %participant.id(),
                    error = %e,
                    "receive failed"
                );
                return Err(e.into());
            }
        }
    }
}

/// Rolls back a partially admitted connection: the presence record that
/// was written for it is removed (best effort) and the stream closed, so
/// a failed admission leaves no state behind.
async fn abort_admission<P: PresenceStore>(
    state: &Arc<ServerState<P>>,
    room_id: &RoomId,
    participant_id: ParticipantId,
    conn: &Arc<SignalConnection>,
) {
    if let Err(e) = state.presence.remove(room_id, participant_id).await {
        tracing::warn!(
            room_id = %room_id,
            %participant_id,
            error = %e,
            "presence rollback failed"
        );
    }
    let _ = conn.close().await;
}
