//! Out-of-band HTTP control API.
//!
//! One route for now: `POST /rooms` creates a room explicitly, ahead of
//! any signaling connection naming it. Conflicts (the identifier is
//! already registered) come back as 409 so a UI can tell "created" from
//! "someone beat you to it". The permissive CORS layer is required
//! because browser clients call this cross-origin.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use crosstalk_presence::PresenceStore;
use crosstalk_protocol::RoomId;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::server::ServerState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
    room_id: String,
}

/// Builds the control router.
pub(crate) fn router<P: PresenceStore>(state: Arc<ServerState<P>>) -> Router {
    Router::new()
        .route("/rooms", post(create_room::<P>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn create_room<P: PresenceStore>(
    State(state): State<Arc<ServerState<P>>>,
    Json(request): Json<CreateRoomRequest>,
) -> impl IntoResponse {
    if request.room_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "roomId must not be empty" })),
        );
    }

    let room_id = RoomId::new(request.room_id);
    match state.registry.create(&room_id).await {
        Ok(room) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "roomId": room.id() })),
        ),
        Err(e) => {
            tracing::debug!(room_id = %room_id, "create room conflict");
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}
