use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use super::app_state::AppState;
use super::{rest_api, ws_handler};

/// Build the axum router: the WebSocket endpoint plus the read-only HTTP
/// surface. CORS is permissive — the browser client is served from another
/// origin and the broker carries no credentials.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", axum::routing::get(ws_handler::ws_upgrade))
        .route(
            "/api/rooms/{id}/presence",
            axum::routing::get(rest_api::get_room_presence),
        )
        .route(
            "/api/rooms/{id}/messages",
            axum::routing::get(rest_api::get_room_messages),
        )
        .layer(cors)
        .with_state(state)
}
