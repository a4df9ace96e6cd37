use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use docbridge_mcp_runtime::{RpcError, error_response, handle_http_jsonrpc};
use serde_json::Value;

use crate::state::AppState;

pub const MCP_PATH: &str = "/mcp";

pub fn router() -> Router<AppState> {
    Router::new().route(MCP_PATH, post(mcp_post).get(mcp_get))
}

async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

/// JSON-RPC over plain HTTP POST. Also mounted as `POST /sse`.
pub async fn mcp_post(State(state): State<AppState>, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(event = "mcp_parse_error", error = %err, "Unparseable JSON-RPC body");
            return (
                StatusCode::OK,
                Json(error_response(Value::Null, RpcError::parse_error())),
            )
                .into_response();
        }
    };

    let responses = handle_http_jsonrpc(&state.runtime, incoming).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (
            StatusCode::OK,
            Json(responses.into_iter().next().unwrap_or(Value::Null)),
        )
            .into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}
