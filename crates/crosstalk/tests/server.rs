//! Integration tests for the relay: admission, routing, presence, and
//! teardown, driven through real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crosstalk::{CrosstalkServer, LivenessConfig, MemoryPresence, ParticipantId,
    PresenceStore, RoomId, SignalMessage};
use crosstalk_presence::PresenceRecord;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

// =========================================================================
// Harness
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    signal_addr: String,
    control_addr: String,
    presence: Arc<MemoryPresence>,
}

/// Starts a relay on random ports with the in-memory presence store.
async fn start_server_with(liveness: LivenessConfig) -> TestServer {
    let presence = Arc::new(MemoryPresence::new());
    let server = CrosstalkServer::<Arc<MemoryPresence>>::builder()
        .bind("127.0.0.1:0")
        .control_bind("127.0.0.1:0")
        .liveness(liveness)
        .build(Arc::clone(&presence))
        .await
        .expect("server should build");

    let signal_addr = server
        .signal_addr()
        .expect("should have signal addr")
        .to_string();
    let control_addr = server
        .control_addr()
        .expect("should have control addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loops a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;

    TestServer {
        signal_addr,
        control_addr,
        presence,
    }
}

/// Default harness: probes far apart so they don't show up in tests that
/// aren't about liveness.
async fn start_server() -> TestServer {
    start_server_with(LivenessConfig::default()).await
}

/// A liveness config aggressive enough to detect death within a test.
fn fast_liveness() -> LivenessConfig {
    LivenessConfig {
        probe_interval: Duration::from_millis(50),
        probe_timeout: Duration::from_millis(40),
        initial_jitter: Duration::ZERO,
        ..LivenessConfig::default()
    }
}

async fn connect(server: &TestServer, room: &str, username: &str, device: &str) -> ClientWs {
    let url = format!(
        "ws://{}/ws/voicechat?roomId={room}&username={username}&device={device}",
        server.signal_addr
    );
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("client should connect");
    ws
}

/// Receives the next signaling message, skipping control frames.
async fn recv_msg(ws: &mut ClientWs) -> SignalMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended while waiting for a message")
            .expect("websocket error while waiting for a message");
        match frame {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("relay sent valid JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Asserts that no signaling message arrives within `window`.
async fn expect_silence(ws: &mut ClientWs, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return, // window elapsed quietly
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(Message::Text(text)))) => {
                panic!("expected silence, got message: {text}")
            }
            Ok(_) => return, // closed; also counts as silence
        }
    }
}

/// Asserts the connection gets closed without ever being welcomed.
async fn expect_refused(mut ws: ClientWs) {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for refusal")
        {
            Some(Ok(Message::Text(text))) => {
                panic!("expected refusal, got message: {text}")
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        }
    }
}

/// Connects and consumes the `welcome`, returning the assigned id.
async fn join(server: &TestServer, room: &str, username: &str, device: &str)
-> (ClientWs, ParticipantId) {
    let mut ws = connect(server, room, username, device).await;
    match recv_msg(&mut ws).await {
        SignalMessage::Welcome { content, .. } => {
            assert_eq!(content.room_id, RoomId::new(room));
            (ws, content.user_id)
        }
        other => panic!("expected welcome, got {other:?}"),
    }
}

async fn send_json(ws: &mut ClientWs, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

// =========================================================================
// Admission flow
// =========================================================================

#[tokio::test]
async fn test_first_join_gets_welcome_and_no_roster() {
    let server = start_server().await;

    let (mut ws, _) = join(&server, "R1", "alice", "web").await;

    // The room was empty, so no existing-users follows the welcome.
    expect_silence(&mut ws, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_second_join_gets_roster_and_first_is_notified() {
    let server = start_server().await;

    let (mut alice, alice_id) = join(&server, "R1", "alice", "web").await;
    let (mut bob, bob_id) = join(&server, "R1", "bob", "mobile").await;

    // Bob's roster: exactly alice.
    match recv_msg(&mut bob).await {
        SignalMessage::ExistingUsers { content, .. } => {
            assert_eq!(content.len(), 1);
            assert_eq!(content[0].user_id, alice_id);
            assert_eq!(content[0].username, "alice");
            assert_eq!(content[0].device, "web");
        }
        other => panic!("expected existing-users, got {other:?}"),
    }

    // Alice hears about bob.
    match recv_msg(&mut alice).await {
        SignalMessage::UserJoined { from, content } => {
            assert_eq!(from, "bob");
            assert_eq!(content.user_id, bob_id);
            assert_eq!(content.device, "mobile");
        }
        other => panic!("expected user-joined, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_identity_refused_original_survives() {
    let server = start_server().await;

    let (mut alice, alice_id) = join(&server, "R1", "alice", "web").await;

    // Same name, same device: the second connection is refused before
    // it is ever welcomed or registered.
    let intruder = connect(&server, "R1", "alice", "web").await;
    expect_refused(intruder).await;

    // The original connection still works.
    send_json(&mut alice, serde_json::json!({"type": "keep-alive"})).await;
    assert!(matches!(
        recv_msg(&mut alice).await,
        SignalMessage::KeepAliveAck { .. }
    ));

    // And the refused attempt left no presence record behind.
    let records = server
        .presence
        .list(&RoomId::new("R1"))
        .await
        .expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, alice_id);
}

#[tokio::test]
async fn test_same_name_different_device_is_admitted() {
    let server = start_server().await;

    let (_alice_web, web_id) = join(&server, "R1", "alice", "web").await;
    let (mut alice_mobile, _) = join(&server, "R1", "alice", "mobile").await;

    match recv_msg(&mut alice_mobile).await {
        SignalMessage::ExistingUsers { content, .. } => {
            assert_eq!(content.len(), 1);
            assert_eq!(content[0].user_id, web_id);
        }
        other => panic!("expected existing-users, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wrong_path_is_rejected() {
    let server = start_server().await;
    let url = format!(
        "ws://{}/ws/other?roomId=R1&username=alice&device=web",
        server.signal_addr
    );
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("upgrade succeeds before the path check");
    expect_refused(ws).await;
}

#[tokio::test]
async fn test_missing_connect_params_rejected() {
    let server = start_server().await;
    let url = format!(
        "ws://{}/ws/voicechat?roomId=R1&username=alice",
        server.signal_addr
    );
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("upgrade succeeds before the param check");
    expect_refused(ws).await;
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_offer_forwarded_to_recipient_only_with_stamped_sender() {
    let server = start_server().await;

    let (mut alice, alice_id) = join(&server, "R1", "alice", "web").await;
    let (mut bob, bob_id) = join(&server, "R1", "bob", "web").await;
    let _ = recv_msg(&mut bob).await; // bob's roster
    let _ = recv_msg(&mut alice).await; // alice: user-joined bob

    let (mut carol, _) = join(&server, "R1", "carol", "web").await;
    let _ = recv_msg(&mut carol).await; // carol's roster
    let _ = recv_msg(&mut alice).await; // alice: user-joined carol
    let _ = recv_msg(&mut bob).await; // bob: user-joined carol

    // Alice offers to bob, spoofing the sender; the relay must stamp it.
    send_json(
        &mut alice,
        serde_json::json!({
            "type": "offer",
            "to": bob_id,
            "from": "someone-else",
            "content": {"sdp": "v=0..."},
        }),
    )
    .await;

    match recv_msg(&mut bob).await {
        SignalMessage::Offer(relay) => {
            assert_eq!(relay.from.as_deref(), Some(alice_id.to_string().as_str()));
            assert_eq!(relay.to, Some(bob_id));
            assert_eq!(relay.content["sdp"], "v=0...");
        }
        other => panic!("expected offer, got {other:?}"),
    }

    // Nobody else hears it.
    expect_silence(&mut carol, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_offer_to_departed_recipient_is_dropped_silently() {
    let server = start_server().await;

    let (mut alice, _) = join(&server, "R1", "alice", "web").await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "offer",
            "to": Uuid::new_v4(),
            "content": {"sdp": "v=0..."},
        }),
    )
    .await;

    // No error, no echo; the connection stays usable.
    send_json(&mut alice, serde_json::json!({"type": "keep-alive"})).await;
    assert!(matches!(
        recv_msg(&mut alice).await,
        SignalMessage::KeepAliveAck { .. }
    ));
}

#[tokio::test]
async fn test_get_users_excludes_requester_and_stale_records() {
    let server = start_server().await;

    let (_alice, alice_id) = join(&server, "R1", "alice", "web").await;
    let (mut bob, _) = join(&server, "R1", "bob", "web").await;
    let _ = recv_msg(&mut bob).await; // roster on join

    // A record left behind by a crashed relay: active in the store but
    // with no live connection.
    let now = Utc::now();
    server
        .presence
        .seed(PresenceRecord {
            id: Uuid::new_v4(),
            room_id: RoomId::new("R1"),
            user_id: ParticipantId::generate(),
            username: "ghost".into(),
            device: "web".into(),
            is_active: true,
            connection_id: Some(Uuid::new_v4()),
            joined_at: now,
            last_seen: now,
        })
        .await;

    send_json(&mut bob, serde_json::json!({"type": "get-users"})).await;

    match recv_msg(&mut bob).await {
        SignalMessage::ExistingUsers { content, .. } => {
            assert_eq!(content.len(), 1, "only the live peer: {content:?}");
            assert_eq!(content[0].user_id, alice_id);
        }
        other => panic!("expected existing-users, got {other:?}"),
    }
}

#[tokio::test]
async fn test_keep_alive_is_acked() {
    let server = start_server().await;
    let (mut alice, _) = join(&server, "R1", "alice", "web").await;

    send_json(&mut alice, serde_json::json!({"type": "keep-alive"})).await;

    match recv_msg(&mut alice).await {
        SignalMessage::KeepAliveAck { from } => assert_eq!(from, "system"),
        other => panic!("expected keep-alive-ack, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_message_type_is_ignored() {
    let server = start_server().await;
    let (mut alice, _) = join(&server, "R1", "alice", "web").await;

    // A tag from the future: no reply, no teardown.
    send_json(
        &mut alice,
        serde_json::json!({"type": "reaction", "emoji": "wave"}),
    )
    .await;

    send_json(&mut alice, serde_json::json!({"type": "keep-alive"})).await;
    assert!(matches!(
        recv_msg(&mut alice).await,
        SignalMessage::KeepAliveAck { .. }
    ));
}

// =========================================================================
// Teardown paths
// =========================================================================

#[tokio::test]
async fn test_clean_close_notifies_peer_and_deactivates_presence() {
    let server = start_server().await;

    let (mut alice, _) = join(&server, "R1", "alice", "web").await;
    let (mut bob, bob_id) = join(&server, "R1", "bob", "web").await;
    let _ = recv_msg(&mut bob).await; // roster
    let _ = recv_msg(&mut alice).await; // user-joined bob

    bob.send(Message::Close(None)).await.expect("close");

    match recv_msg(&mut alice).await {
        SignalMessage::UserLeft { from, content } => {
            assert_eq!(from, "bob");
            assert_eq!(content.user_id, bob_id);
            assert_eq!(content.username, "bob");
        }
        other => panic!("expected user-left, got {other:?}"),
    }

    // The durable record is soft-deleted, not erased.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = server
        .presence
        .record(&RoomId::new("R1"), bob_id)
        .await
        .expect("record still exists");
    assert!(!record.is_active);
}

#[tokio::test]
async fn test_malformed_frame_tears_down_sender_only() {
    let server = start_server().await;

    let (mut alice, _) = join(&server, "R1", "alice", "web").await;
    let (mut bob, bob_id) = join(&server, "R1", "bob", "web").await;
    let _ = recv_msg(&mut bob).await; // roster
    let _ = recv_msg(&mut alice).await; // user-joined bob

    bob.send(Message::Text("not json at all".into()))
        .await
        .expect("send");

    // Bob gets torn down; alice survives and hears the departure.
    match recv_msg(&mut alice).await {
        SignalMessage::UserLeft { content, .. } => assert_eq!(content.user_id, bob_id),
        other => panic!("expected user-left, got {other:?}"),
    }

    send_json(&mut alice, serde_json::json!({"type": "keep-alive"})).await;
    assert!(matches!(
        recv_msg(&mut alice).await,
        SignalMessage::KeepAliveAck { .. }
    ));
}

#[tokio::test]
async fn test_abrupt_disconnect_notifies_exactly_once() {
    // Fast probes so the liveness path races the receive-error path;
    // teardown must still fire exactly once.
    let server = start_server_with(fast_liveness()).await;

    let (mut alice, _) = join(&server, "R1", "alice", "web").await;
    let (mut bob, bob_id) = join(&server, "R1", "bob", "web").await;
    let _ = recv_msg(&mut bob).await; // roster
    let _ = recv_msg(&mut alice).await; // user-joined bob

    // Kill bob's socket without a close handshake.
    drop(bob);

    // Collect everything alice hears for a few probe intervals.
    let mut user_left_count = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(400);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, alice.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let msg: SignalMessage = serde_json::from_str(&text).expect("valid JSON");
                if let SignalMessage::UserLeft { content, .. } = msg {
                    assert_eq!(content.user_id, bob_id);
                    user_left_count += 1;
                }
            }
            Ok(Some(Ok(_))) => continue, // control frames
            _ => break,
        }
    }

    assert_eq!(user_left_count, 1, "user-left must be delivered exactly once");

    let record = server
        .presence
        .record(&RoomId::new("R1"), bob_id)
        .await
        .expect("record exists");
    assert!(!record.is_active, "presence reflects the departure");
}

// =========================================================================
// Control API
// =========================================================================

#[tokio::test]
async fn test_create_room_then_conflict() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/rooms", server.control_addr);

    let created = client
        .post(&url)
        .json(&serde_json::json!({"roomId": "lobby"}))
        .send()
        .await
        .expect("request");
    assert_eq!(created.status(), 201);
    let body: serde_json::Value = created.json().await.expect("json body");
    assert_eq!(body["roomId"], "lobby");

    let conflict = client
        .post(&url)
        .json(&serde_json::json!({"roomId": "lobby"}))
        .send()
        .await
        .expect("request");
    assert_eq!(conflict.status(), 409);

    let empty = client
        .post(&url)
        .json(&serde_json::json!({"roomId": ""}))
        .send()
        .await
        .expect("request");
    assert_eq!(empty.status(), 400);
}

#[tokio::test]
async fn test_join_explicitly_created_room() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/rooms", server.control_addr);

    let created = client
        .post(&url)
        .json(&serde_json::json!({"roomId": "pre-made"}))
        .send()
        .await
        .expect("request");
    assert_eq!(created.status(), 201);

    // Joining resolves to the explicitly created room, not a conflict.
    let (mut ws, _) = join(&server, "pre-made", "alice", "web").await;
    expect_silence(&mut ws, Duration::from_millis(150)).await;
}
