use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Extension,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use sowama_types::api::Claims;
use sowama_types::events::EngineEvent;

use crate::state::AppState;

/// Server-sent stream of the caller's own events plus global ones.
pub async fn stream_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = claims.sub.to_string();
    let mut rx = state.engine.subscribe();
    debug!("{} subscribed to events", user_id);

    let stream = async_stream::stream! {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("Event stream for {} lagged by {} events", user_id, n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if event.user_id().is_some_and(|owner| owner != user_id) {
                continue;
            }

            match Event::default().event(event_name(&event)).json_data(&event) {
                Ok(sse) => yield Ok(sse),
                Err(e) => warn!("Could not encode event: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn event_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::EntryRecorded { .. } => "entry_recorded",
        EngineEvent::TokenValueUpdated { .. } => "token_value_updated",
        EngineEvent::RateUpdated { .. } => "rate_updated",
        EngineEvent::ClaimStatusChanged { .. } => "claim_status_changed",
    }
}
