//! `GET /events`: fans the three `EventBus` broadcast channels into one
//! `text/event-stream`, each kind tagged with its own SSE `event:` name
use crate::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;

pub async fn sse_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let bus = state.supervisor.event_bus();

    let status = BroadcastStream::new(bus.subscribe_status()).filter_map(|r| async move {
        r.ok().and_then(|s| serde_json::to_string(&s).ok()).map(|data| Ok(Event::default().event("status").data(data)))
    });
    let tool_index = BroadcastStream::new(bus.subscribe_tool_index_update()).filter_map(|r| async move {
        r.ok()
            .and_then(|s| serde_json::to_string(&s).ok())
            .map(|data| Ok(Event::default().event("tool_index_update").data(data)))
    });
    let server_state = BroadcastStream::new(bus.subscribe_server_state()).filter_map(|r| async move {
        r.ok().and_then(|s| serde_json::to_string(&s).ok()).map(|data| Ok(Event::default().event("server_state").data(data)))
    });

    let merged = stream::select(stream::select(status, tool_index), server_state);
    Sse::new(merged).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
