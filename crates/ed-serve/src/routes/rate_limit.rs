use crate::middleware::correlation::CorrelationId;
use crate::middleware::identity::Operator;
use crate::routes::error::map_error;
use crate::{AppState, with_dispatcher};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use ed_core::rate_limit::AttemptMark;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rate-limit/{identifier}/attempts", get(recent_attempts))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/rate-limit/{identifier}/attempts",
    params(
        ("identifier" = String, Path, description = "User ID or contact phone"),
        ("x-operator" = String, Header, description = "Must be `true`")
    ),
    responses((status = 200, body = Vec<AttemptMark>), (status = 403))
)]
pub(crate) async fn recent_attempts(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    _operator: Operator,
    Path(identifier): Path<String>,
) -> Response {
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.recent_attempts(&identifier)
    })
    .await
    {
        Ok(attempts) => Json(attempts).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}
