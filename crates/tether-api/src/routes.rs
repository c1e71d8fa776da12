//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tether_kernel::TetherKernel;
use tether_runtime::mcp_server::{handle_mcp_request, make_error};
use tracing::debug;

/// Shared application state.
pub struct AppState {
    pub kernel: Arc<TetherKernel>,
}

/// `GET /api/status`: bridge health and connected peers.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.kernel.status();
    Json(json!({
        "server": "running",
        "mcp_tools": "active",
        "websocket_connections": status.websocket_connections,
        "pending_requests": status.pending_requests,
        "uptime_secs": status.uptime_secs,
        "peers": status.peers,
        "bridge": status.bridge,
    }))
}

/// `GET /api/health`: liveness check.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// `POST /mcp`: one JSON-RPC message per request.
///
/// Notifications are acknowledged with `202 Accepted` and an empty body.
pub async fn mcp_http(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Unparseable MCP request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(make_error(Value::Null, -32700, &format!("Parse error: {e}"))),
            )
                .into_response();
        }
    };

    match handle_mcp_request(&request, &state.kernel.tools).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
