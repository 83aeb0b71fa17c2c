use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use coding_agent::runtime::SessionError;
use coding_agent::OutputEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use crate::server::api::ApiError;
use crate::server::ServerState;

/// Frames buffered between the blocking run and the HTTP response.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventsQuery {
    pub session_id: String,
}

/// Streams one session: heartbeats and status while idle, the run's events
/// once a message is queued. The run stops when the client disconnects.
pub(crate) async fn stream_events(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, ApiError> {
    if query.session_id.trim().is_empty() {
        return Err(SessionError::EmptySessionId.into());
    }

    let stream = state.copilot.stream(query.session_id);
    let faults = state.faults.clone();
    let (sender, receiver) = mpsc::channel(EVENT_BUFFER);

    tokio::task::spawn_blocking(move || {
        let result = stream.run(&mut |event: OutputEvent| {
            event.sse_payloads().into_iter().all(|payload| {
                sender
                    .blocking_send(Ok(Event::default().data(payload)))
                    .is_ok()
            })
        });
        if let Err(fault) = result {
            error!(%fault, "event stream aborted");
            let _ = faults.send(fault);
        }
    });

    Ok(Sse::new(ReceiverStream::new(receiver)))
}
