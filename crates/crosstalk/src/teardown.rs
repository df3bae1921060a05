//! Participant teardown: the single cleanup routine every exit path runs.
//!
//! A connection can die four ways: the peer closes cleanly, a frame fails
//! to decode, the transport errors under the receive loop, or a liveness
//! probe fails. All four paths converge here, and the participant's
//! teardown flag guarantees the cleanup body runs exactly once no matter
//! how many paths fire, or in what order.

use std::sync::Arc;

use crosstalk_presence::PresenceStore;
use crosstalk_protocol::SignalMessage;
use crosstalk_room::{Participant, Room};
use crosstalk_transport::Connection;
use tokio::task::JoinHandle;

use crate::server::{ServerState, SignalConnection};

/// Everything needed to cleanly release one participant.
pub(crate) struct Teardown<P: PresenceStore> {
    state: Arc<ServerState<P>>,
    participant: Arc<Participant<SignalConnection>>,
    room: Arc<Room<SignalConnection>>,
    /// The participant's auxiliary tasks (probe loop, presence touch).
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<P: PresenceStore> Teardown<P> {
    pub(crate) fn new(
        state: Arc<ServerState<P>>,
        participant: Arc<Participant<SignalConnection>>,
        room: Arc<Room<SignalConnection>>,
    ) -> Self {
        Self {
            state,
            participant,
            room,
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Registers an auxiliary task to be aborted during teardown.
    pub(crate) async fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    /// Runs the cleanup sequence. Safe to call from any number of exit
    /// paths; only the first caller does the work.
    ///
    /// Order matters: timers stop first (a probe firing mid-cleanup would
    /// report a death that is already being handled), then the durable
    /// record, then the room entry, then the leave notification to the
    /// remaining members, then room reclamation, then the stream itself.
    pub(crate) async fn run(&self) {
        if !self.participant.begin_teardown() {
            return;
        }

        let participant_id = self.participant.id();
        let room_id = self.participant.room_id().clone();
        tracing::info!(
            room_id = %room_id,
            %participant_id,
            "tearing down participant"
        );

        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }

        if let Err(e) = self.state.presence.remove(&room_id, participant_id).await {
            tracing::warn!(
                room_id = %room_id,
                %participant_id,
                error = %e,
                "presence removal failed"
            );
        }

        self.room.remove(&participant_id).await;

        self.room
            .broadcast(
                &SignalMessage::user_left(
                    participant_id,
                    self.participant.username().to_string(),
                ),
                None,
            )
            .await;

        self.state.registry.reclaim_if_empty(&room_id).await;

        if let Err(e) = self.participant.connection().close().await {
            tracing::debug!(%participant_id, error = %e, "close during teardown failed");
        }
    }
}

/// Drop guard: if the handler unwinds without reaching an explicit exit
/// path, teardown still runs. `Drop` is synchronous, so the async cleanup
/// is fired as a detached task.
pub(crate) struct TeardownGuard<P: PresenceStore>(Arc<Teardown<P>>);

impl<P: PresenceStore> TeardownGuard<P> {
    pub(crate) fn new(teardown: Arc<Teardown<P>>) -> Self {
        Self(teardown)
    }
}

impl<P: PresenceStore> Drop for TeardownGuard<P> {
    fn drop(&mut self) {
        if !self.0.participant.is_torn_down() {
            let teardown = Arc::clone(&self.0);
            tokio::spawn(async move { teardown.run().await });
        }
    }
}
