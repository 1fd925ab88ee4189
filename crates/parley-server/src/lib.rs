pub mod routes;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_gateway::ChatService;

/// Build the application router: the WebSocket endpoint at `socket_path`
/// plus the HTTP polling fallback under `/api/messages`.
pub fn app(service: ChatService, socket_path: &str) -> Router {
    Router::new()
        .route("/api/messages", get(routes::get_messages))
        .route("/api/messages", post(routes::post_message))
        .route(socket_path, get(routes::ws_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
