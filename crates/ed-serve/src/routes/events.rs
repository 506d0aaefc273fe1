use crate::middleware::correlation::CorrelationId;
use crate::routes::error::map_error;
use crate::{AppState, with_dispatcher};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use ed_events::types::EventRecord;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, serde::Deserialize, ToSchema, IntoParams)]
pub struct EventsQuery {
    after: Option<i64>,
    limit: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/subscribe", get(subscribe))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(EventsQuery),
    responses((status = 200, body = Vec<EventRecord>))
)]
pub(crate) async fn list_events(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<EventsQuery>,
) -> Response {
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.events().list(query.after, query.limit)
    })
    .await
    {
        Ok(events) => Json(events).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}

#[utoipa::path(
    get,
    path = "/api/events/subscribe",
    params(EventsQuery),
    responses((status = 200, description = "Server-sent event stream of EventRecord"))
)]
pub(crate) async fn subscribe(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<EventsQuery>,
) -> Response {
    crate::sse::subscribe(state, query.after, Some(correlation.0)).await
}
