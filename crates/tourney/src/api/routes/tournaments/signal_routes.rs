use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use log::{debug, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::startup::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SignalFilter {
    #[serde(default)]
    pub tournament_id: Option<Uuid>,
}

/// Server-sent lifecycle signals, named `<kind>.<outcome>` (e.g. `started.failure`).
/// Only signals emitted after subscribing are delivered.
pub async fn stream_signals(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SignalFilter>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.coordinator.signals().subscribe();
    let shutdown = state.cancellation_token.clone();
    let only_tournament = filter.tournament_id;

    let stream = futures::stream::unfold(receiver, move |mut receiver| {
        let shutdown = shutdown.clone();
        async move {
            loop {
                let signal = tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    received = receiver.recv() => received,
                };
                match signal {
                    Ok(signal) => {
                        if only_tournament.is_some_and(|id| id != signal.tournament_id) {
                            continue;
                        }
                        let event = Event::default()
                            .event(signal.event_name())
                            .json_data(&signal);
                        return Some((event, receiver));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("signal listener fell behind, skipped {} signals", skipped);
                    }
                    Err(RecvError::Closed) => {
                        debug!("signal channel closed");
                        return None;
                    }
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
