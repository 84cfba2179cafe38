use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};

use crate::engine::events::PresenceEntry;
use crate::engine::ledger::Message;

use super::app_state::AppState;

/// `GET /api/rooms/{id}/presence` — live presence snapshot. Unknown rooms
/// read as empty; implicit creation makes the two indistinguishable.
pub async fn get_room_presence(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Json<Vec<PresenceEntry>> {
    Json(state.broker.presence(&room_id))
}

/// `GET /api/rooms/{id}/messages` — ordered ledger snapshot.
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Json<Vec<Message>> {
    Json(state.broker.snapshot(&room_id))
}
