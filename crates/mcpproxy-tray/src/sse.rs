//! SSE reconnect client for `GET /events` (`mcpproxy_api::sse::sse_handler`).
//! `reqwest_eventsource::EventSource` only wraps a real `reqwest`
//! request, so this is TCP-only: when the tray's configured endpoint is
//! `unix://`/`npipe://`, event delivery isn't available this way and
//! the tray falls back to periodic `/ready` polling via
//! [`crate::health`] instead (see `DESIGN.md`).
//! Reconnects with capped exponential backoff and emits
//! [`crate::fsm::Event`]s so the state machine can track connectivity.

use crate::fsm::Event as FsmEvent;
use futures::StreamExt;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const BASE_DELAY: Duration = Duration::from_secs(2);
const CAP_DELAY: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 10;

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BASE_DELAY.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = scaled.min(CAP_DELAY);
    let jitter_ms = fastrand::u64(0..250);
    capped + Duration::from_millis(jitter_ms)
}

/// Runs until `core_url` can no longer be reconnected to within
/// [`MAX_ATTEMPTS`], forwarding connectivity transitions on `events` for
/// the FSM driver to fold in. Only meaningful when the tray was
/// configured with an `http(s)://` endpoint.
pub async fn run(core_url: &str, events: mpsc::Sender<FsmEvent>) {
    let url = format!("{core_url}/events");
    let mut attempt = 0u32;

    loop {
        let mut source = match EventSource::get(&url).map_err(|e| e.to_string()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to build SSE request");
                break;
            }
        };

        let mut connected_this_attempt = false;
        while let Some(event) = source.next().await {
            match event {
                Ok(SseEvent::Open) => {
                    debug!("sse stream opened");
                    connected_this_attempt = true;
                    attempt = 0;
                    let _ = events.send(FsmEvent::ApiConnected).await;
                }
                Ok(SseEvent::Message(_msg)) => {
                    // Message payloads are surfaced to the tray's own UI
                    // layer elsewhere; the FSM only cares that the
                    // stream is alive.
                }
                Err(e) => {
                    debug!(error = %e, "sse stream error");
                    source.close();
                    break;
                }
            }
        }

        if connected_this_attempt {
            let _ = events.send(FsmEvent::ConnectionLost).await;
        }

        attempt += 1;
        if attempt >= MAX_ATTEMPTS {
            let _ = events.send(FsmEvent::ReconnectExhausted).await;
            break;
        }
        tokio::time::sleep(backoff_delay(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        let d0 = backoff_delay(0);
        let d3 = backoff_delay(3);
        let d10 = backoff_delay(10);
        assert!(d0 >= BASE_DELAY && d0 < BASE_DELAY + Duration::from_millis(250));
        assert!(d3 > d0);
        assert!(d10 <= CAP_DELAY + Duration::from_millis(250));
    }
}
