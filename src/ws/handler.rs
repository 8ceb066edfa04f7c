//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /ws`: upgrades the HTTP connection to a WebSocket.
#[utoipa::path(
    get,
    path = "/ws",
    tag = "Realtime",
    summary = "Open a real-time connection",
    description = "Upgrades to a WebSocket. Clients send `{\"type\", \"data\"}` envelopes \
                   and receive every broadcast as a text frame.",
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 400, description = "Not a WebSocket upgrade request"),
    )
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "failed to upgrade to websocket"))
        .on_upgrade(move |socket| run_connection(socket, state))
}
