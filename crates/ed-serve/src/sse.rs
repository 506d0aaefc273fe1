use crate::routes::error::map_error;
use crate::{AppState, with_dispatcher};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use ed_events::types::EventRecord;
use futures::stream::{self, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

fn to_event(record: &EventRecord) -> Event {
    let json = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    let event = Event::default().id(record.seq.to_string()).data(json);
    match record.kind() {
        Some(kind) => event.event(kind),
        None => event,
    }
}

/// Replays journaled events after `after`, then follows the live bus. The
/// live receiver is taken before the replay query so nothing committed in
/// between is missed; duplicates are dropped by sequence.
pub async fn subscribe(state: AppState, after: Option<i64>, correlation_id: Option<String>) -> Response {
    let live = state.event_bus().subscribe();
    let history = match with_dispatcher(&state, move |dispatcher| {
        dispatcher.events().list(after, None)
    })
    .await
    {
        Ok(events) => events,
        Err(err) => return map_error(&err, correlation_id),
    };
    let last_seen = history
        .last()
        .map(|record| record.seq)
        .or(after)
        .unwrap_or(0);

    let history_stream =
        stream::iter(history.into_iter().map(|record| Ok::<Event, Infallible>(to_event(&record))));

    let live_stream = BroadcastStream::new(live).filter_map(move |item| async move {
        match item {
            Ok(record) if record.seq > last_seen => Some(Ok::<Event, Infallible>(to_event(&record))),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "event subscriber lagged");
                None
            }
        }
    });

    Sse::new(history_stream.chain(live_stream))
        .keep_alive(KeepAlive::default())
        .into_response()
}
