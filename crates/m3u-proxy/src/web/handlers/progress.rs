//! `GET /api/v1/progress/events` (spec §6.2): SSE stream of progress events,
//! seeded with the current state of every active operation.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use std::convert::Infallible;

use crate::web::AppState;

pub async fn progress_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.progress.subscribe();

    let stream = stream::unfold(subscription, |subscription| async move {
        let operation = subscription.recv().await;
        let event = match serde_json::to_string(&operation) {
            Ok(json) => Event::default().event("progress").data(json),
            Err(err) => Event::default().event("error").data(err.to_string()),
        };
        Some((Ok(event), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
