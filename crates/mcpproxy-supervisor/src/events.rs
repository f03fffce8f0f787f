//! SSE-bus event types published by actors and consumed by `mcpproxy-api`
//! Three independent broadcast channels back the three named event kinds
//! so a slow subscriber only loses `status` updates (drop-oldest) and
//! never a `tool_index_update` or `server_state` transition
use mcpproxy_core::domain::{Health, UpstreamState};
use mcpproxy_index::document::DiffOutcome;
use serde::Serialize;
use tokio::sync::broadcast;

/// Bounded capacity of the lossy `status` channel. A
/// `tokio::sync::broadcast` sender naturally drops the oldest entry for a
/// lagging receiver once its ring buffer is full, which is exactly the
/// drop-oldest semantic `status` events need.
const STATUS_CAPACITY: usize = 16;

/// Capacity for state-transition channels, sized generously so a
/// publish practically never laps a subscriber.
const TRANSITION_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub connected: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStateEvent {
    pub server: String,
    pub state: UpstreamState,
    pub health: Health,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolIndexUpdateEvent {
    pub server: String,
    pub diff: DiffOutcome,
}

/// Fan-out hub for the three SSE event kinds 
#[derive(Clone)]
pub struct EventBus {
    status: broadcast::Sender<StatusSummary>,
    tool_index_update: broadcast::Sender<ToolIndexUpdateEvent>,
    server_state: broadcast::Sender<ServerStateEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            status: broadcast::channel(STATUS_CAPACITY).0,
            tool_index_update: broadcast::channel(TRANSITION_CAPACITY).0,
            server_state: broadcast::channel(TRANSITION_CAPACITY).0,
        }
    }

    pub fn publish_status(&self, summary: StatusSummary) {
        let _ = self.status.send(summary);
    }

    pub fn publish_tool_index_update(&self, event: ToolIndexUpdateEvent) {
        let _ = self.tool_index_update.send(event);
    }

    pub fn publish_server_state(&self, event: ServerStateEvent) {
        let _ = self.server_state.send(event);
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusSummary> {
        self.status.subscribe()
    }

    pub fn subscribe_tool_index_update(&self) -> broadcast::Receiver<ToolIndexUpdateEvent> {
        self.tool_index_update.subscribe()
    }

    pub fn subscribe_server_state(&self) -> broadcast::Receiver<ServerStateEvent> {
        self.server_state.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_overflow_drops_oldest_not_the_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_status();
        for i in 0..(STATUS_CAPACITY * 2) {
            bus.publish_status(StatusSummary { connected: i, total: 10 });
        }
        // The receiver lagged; it should still be able to recover and read
        // the most recent values rather than erroring forever.
        let mut last = None;
        while let Ok(summary) = rx.try_recv() {
            last = Some(summary);
        }
        assert!(last.is_some());
    }
}
