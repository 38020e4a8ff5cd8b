//! Server-Sent Events (SSE) utilities
//!
//! Live views subscribe to a store root and receive the full snapshot on
//! every change.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;

/// Interval between keep-alive comments
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Forward a snapshot stream to an SSE client.
///
/// Sends a `ConnectionStatus` event first, then one `event_name` event with
/// the JSON snapshot per stream item. A failed read is sent as an `Error`
/// event and the subscription stays open.
///
/// # Example
/// ```rust,ignore
/// pub async fn project_events(
///     State(state): State<AppState>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     bimdash_common::sse::snapshot_sse("ProjectSnapshot", state.projects.watch())
/// }
/// ```
pub fn snapshot_sse<S, T>(
    event_name: &'static str,
    snapshots: S,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>
where
    S: Stream<Item = Result<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    info!("New SSE client connected to {} events", event_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        let mut snapshots = Box::pin(snapshots);
        while let Some(item) = snapshots.next().await {
            let encoded = item.and_then(|snapshot| Ok(serde_json::to_string(&snapshot)?));
            match encoded {
                Ok(json) => {
                    debug!("SSE: Sending {}", event_name);
                    yield Ok(Event::default().event(event_name).data(json));
                }
                Err(e) => {
                    warn!("SSE: {} snapshot failed: {}", event_name, e);
                    yield Ok(Event::default().event("Error").data(e.to_string()));
                }
            }
        }

        debug!("SSE: {} stream ended", event_name);
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
