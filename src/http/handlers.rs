use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::server::ServerState;

/// Liveness probe, no dependency checks
pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Health snapshot read from the lifecycle state at request time
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.health.snapshot()))
}

/// Everything else goes to the business routes, once they exist
pub async fn dispatch_handler(State(state): State<ServerState>, request: Request) -> Response {
    state.routes.dispatch(request).await
}
