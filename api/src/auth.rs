use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use docbridge_core::auth::{parse_bearer, token_matches};

use crate::error::AppError;
use crate::state::AppState;

/// Bearer gate for every route except health and the OpenAPI document.
/// Runs before extraction, so a rejected request never reaches the store
/// handle or the upstream API.
pub async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(req).await;
    };

    let verdict = match req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        None => Err("Missing access token"),
        Some(raw) => parse_bearer(raw).and_then(|token| {
            if token_matches(token, expected) {
                Ok(())
            } else {
                Err("Invalid access token")
            }
        }),
    };

    match verdict {
        Ok(()) => next.run(req).await,
        Err(description) => {
            tracing::warn!(
                event = "auth_rejected",
                method = %req.method(),
                path = %req.uri().path(),
                reason = description,
                "Rejected request without a valid bearer token"
            );
            AppError::Unauthorized(description.to_string()).into_response()
        }
    }
}
