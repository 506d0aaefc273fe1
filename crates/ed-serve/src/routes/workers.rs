use crate::middleware::correlation::CorrelationId;
use crate::routes::error::{error_response, invalid_input, map_error};
use crate::{AppState, with_dispatcher};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::{Extension, Json, Router};
use ed_core::types::io::UpsertWorkerInput;
use ed_core::types::{WorkerId, WorkerSnapshot};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workers/{id}/availability", put(put_availability).get(get_availability))
        .with_state(state)
}

fn parse_worker(id: String, correlation_id: Option<String>) -> Result<WorkerId, Response> {
    WorkerId::new(id).map_err(|err| invalid_input(err.to_string(), correlation_id))
}

#[utoipa::path(
    put,
    path = "/api/workers/{id}/availability",
    params(("id" = String, Path, description = "Worker ID")),
    request_body = UpsertWorkerInput,
    responses((status = 200, body = WorkerSnapshot), (status = 400))
)]
pub(crate) async fn put_availability(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<UpsertWorkerInput>,
) -> Response {
    let worker_id = match parse_worker(id, Some(correlation.0.clone())) {
        Ok(worker_id) => worker_id,
        Err(response) => return response,
    };
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.workers().upsert(&worker_id, input)
    })
    .await
    {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}

#[utoipa::path(
    get,
    path = "/api/workers/{id}/availability",
    params(("id" = String, Path, description = "Worker ID")),
    responses((status = 200, body = WorkerSnapshot), (status = 404))
)]
pub(crate) async fn get_availability(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let worker_id = match parse_worker(id, Some(correlation.0.clone())) {
        Ok(worker_id) => worker_id,
        Err(response) => return response,
    };
    match with_dispatcher(&state, move |dispatcher| dispatcher.workers().get(&worker_id)).await {
        Ok(Some(snapshot)) => Json(snapshot).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "worker has no availability snapshot".to_string(),
            Some(correlation.0),
        ),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}
