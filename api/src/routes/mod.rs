use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::state::AppState;

pub mod health;
pub mod ingest;
pub mod mcp_http;
pub mod openapi;
pub mod sse;

/// Every route, with the bearer gate on everything but health and the
/// OpenAPI document. CORS is added by the caller.
pub fn build(state: AppState, max_body_bytes: usize) -> Router {
    let protected = Router::new()
        .merge(ingest::router())
        .merge(mcp_http::router())
        .merge(sse::router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .merge(health::router())
        .merge(openapi::router())
        .merge(protected)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
