use std::convert::Infallible;

use axum::Router;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use tokio::time::{Instant, interval_at};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

use super::mcp_http::mcp_post;
use crate::state::AppState;

pub const SSE_PATH: &str = "/sse";

pub fn router() -> Router<AppState> {
    Router::new().route(SSE_PATH, get(sse_stream).post(mcp_post))
}

/// Compatibility stream for clients that still open an SSE channel first.
/// Sends an `endpoint` event naming where to POST JSON-RPC, then a `ping`
/// on every heartbeat until the client goes away.
async fn sse_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let heartbeat = state.sse_heartbeat;
    tracing::info!(
        event = "sse_client_connected",
        heartbeat_ms = heartbeat.as_millis() as u64,
        "SSE client connected"
    );

    let endpoint = tokio_stream::once(Ok::<_, Infallible>(
        Event::default().event("endpoint").data(SSE_PATH),
    ));
    let pings = IntervalStream::new(interval_at(Instant::now() + heartbeat, heartbeat)).map(|_| {
        Ok::<_, Infallible>(
            Event::default()
                .event("ping")
                .data(chrono::Utc::now().to_rfc3339()),
        )
    });

    Sse::new(endpoint.chain(pings))
}
