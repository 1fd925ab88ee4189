use axum::{
    Json,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use parley_gateway::{ChatService, SubmitError, connection};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub author: String,
    pub body: String,
}

/// GET /api/messages, the polling fallback read. Returns the same `recent(50)`
/// snapshot the WebSocket history event carries, ascending by id.
pub async fn get_messages(
    State(service): State<ChatService>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = service.history().await.map_err(|e| {
        error!("history load failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(messages))
}

/// POST /api/messages, the polling fallback submission. This transport has a
/// response channel, so failures map to status codes here; the WebSocket
/// path keeps its no-reply behavior.
pub async fn post_message(
    State(service): State<ChatService>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let stored = service
        .submit(req.author, req.body)
        .await
        .map_err(|e| match e {
            SubmitError::Rejected(_) => StatusCode::BAD_REQUEST,
            SubmitError::Unavailable(_) => {
                error!("submission lost: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Upgrade handler on the socket path; hands the socket to the gateway.
pub async fn ws_upgrade(
    State(service): State<ChatService>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, service))
}
