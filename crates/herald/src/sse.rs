//! Legacy HTTP+SSE front end.
//!
//! Older clients connect via GET /sse for server-initiated events and
//! POST their JSON-RPC requests to /message with snake_case tool
//! arguments. The event stream carries monitor link state transitions.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::Dialect;
use crate::link::LinkEvent;
use crate::mcp::{handle_rpc, AppState, JsonRpcRequest};

/// Handle SSE connection requests.
///
/// Clients connect here to observe the monitor link: every state
/// transition (ready, backoff, gave_up, ...) is published as one event.
#[tracing::instrument(skip(state))]
pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = Uuid::new_v4();
    info!(%session, "SSE client connected");

    let rx = state.link.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) => Some(Ok(link_event_to_sse(&event))),
        Err(e) => {
            // Lagged receiver; skipped transitions are not replayed.
            debug!(%session, "link event receive error: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

fn link_event_to_sse(event: &LinkEvent) -> Event {
    Event::default().event("link_state").data(
        serde_json::json!({
            "from": event.from.as_str(),
            "to": event.to.as_str(),
        })
        .to_string(),
    )
}

/// JSON-RPC endpoint paired with /sse. Same methods as /mcp, legacy
/// argument spelling.
#[tracing::instrument(skip(state, request), fields(method = %request.method))]
pub async fn message_handler(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let response = handle_rpc(&state, request, Dialect::Legacy).await;
    Json(response).into_response()
}
