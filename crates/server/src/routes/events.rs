//! Server-Sent Events stream of the caller's realtime events.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};

use crate::middleware::RequireAuth;
use crate::services::realtime::RealtimePayload;
use crate::state::AppState;

/// Interval between keep-alive comments so proxies keep the stream open.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Stream `message` and `notification` events addressed to the caller.
pub async fn stream(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(user_id = %user.id, "Realtime stream opened");

    let events = state
        .realtime()
        .subscribe(user.id)
        .filter_map(|payload| async move { to_event(&payload) })
        .map(Ok);

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

fn to_event(payload: &RealtimePayload) -> Option<Event> {
    match Event::default().event(payload.event_name()).json_data(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode realtime event");
            None
        }
    }
}
