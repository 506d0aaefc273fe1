use crate::middleware::correlation::CorrelationId;
use crate::middleware::identity::{Caller, Operator};
use crate::routes::error::{invalid_input, map_error};
use crate::{AppState, with_dispatcher};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use ed_core::RequestContext;
use ed_core::types::io::{
    CreateEmergencyInput, IntakeReceipt, OperatorInput, RequestDetail, RequestFilter,
    RespondInput, ResponseReceipt,
};
use ed_core::types::{DispatchAttempt, EmergencyRequest, RequestId, RequestStatus, Urgency, UserId};
use ed_events::types::EventSource;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, serde::Deserialize, ToSchema, IntoParams)]
pub struct ListQuery {
    status: Option<RequestStatus>,
    urgency: Option<Urgency>,
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    requester: Option<UserId>,
    limit: Option<u32>,
}

impl From<ListQuery> for RequestFilter {
    fn from(query: ListQuery) -> Self {
        Self {
            status: query.status,
            urgency: query.urgency,
            requester: query.requester,
            limit: query.limit,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/emergencies", post(create_emergency).get(list_emergencies))
        .route("/emergencies/{id}", get(get_emergency))
        .route("/emergencies/{id}/attempts", get(list_attempts))
        .route("/emergencies/{id}/respond", post(respond))
        .route("/emergencies/{id}/dispatch", post(dispatch))
        .route("/emergencies/{id}/escalate", post(escalate))
        .route("/emergencies/{id}/resolve", post(resolve))
        .route("/emergencies/{id}/cancel", post(cancel))
        .with_state(state)
}

fn parse_id(id: &str, correlation_id: Option<String>) -> Result<RequestId, Response> {
    id.parse::<RequestId>()
        .map_err(|err| invalid_input(err.to_string(), correlation_id))
}

/// An empty body means no note.
fn parse_operator_input(
    body: &Bytes,
    correlation_id: Option<String>,
) -> Result<OperatorInput, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(OperatorInput::default());
    }
    serde_json::from_slice(body).map_err(|err| invalid_input(err.to_string(), correlation_id))
}

#[utoipa::path(
    post,
    path = "/api/emergencies",
    request_body = CreateEmergencyInput,
    params(("x-user-id" = Option<String>, Header, description = "Authenticated requester")),
    responses(
        (status = 201, body = IntakeReceipt),
        (status = 400, description = "Invalid coordinates, urgency or contact details"),
        (status = 429, description = "Rate limited; see Retry-After")
    )
)]
pub(crate) async fn create_emergency(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    caller: Caller,
    Json(mut input): Json<CreateEmergencyInput>,
) -> Response {
    input.requester = caller.user_id;
    let ctx = RequestContext::new(EventSource::Requester, Some(correlation.0));
    let correlation_id = ctx.correlation_id.clone();
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().create(&ctx, input)
    })
    .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(err) => map_error(&err, correlation_id),
    }
}

#[utoipa::path(
    get,
    path = "/api/emergencies",
    params(ListQuery),
    responses((status = 200, body = Vec<EmergencyRequest>))
)]
pub(crate) async fn list_emergencies(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = RequestFilter::from(query);
    match with_dispatcher(&state, move |dispatcher| dispatcher.emergencies().list(&filter)).await {
        Ok(requests) => Json(requests).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}

#[utoipa::path(
    get,
    path = "/api/emergencies/{id}",
    params(("id" = String, Path, description = "Emergency request ID")),
    responses((status = 200, body = RequestDetail), (status = 404))
)]
pub(crate) async fn get_emergency(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id, Some(correlation.0.clone())) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match with_dispatcher(&state, move |dispatcher| dispatcher.emergencies().detail(&id)).await {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}

#[utoipa::path(
    get,
    path = "/api/emergencies/{id}/attempts",
    params(("id" = String, Path, description = "Emergency request ID")),
    responses((status = 200, body = Vec<DispatchAttempt>), (status = 404))
)]
pub(crate) async fn list_attempts(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id, Some(correlation.0.clone())) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match with_dispatcher(&state, move |dispatcher| dispatcher.emergencies().attempts(&id)).await {
        Ok(attempts) => Json(attempts).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)),
    }
}

#[utoipa::path(
    post,
    path = "/api/emergencies/{id}/respond",
    params(("id" = String, Path, description = "Emergency request ID")),
    request_body = RespondInput,
    responses(
        (status = 200, body = ResponseReceipt),
        (status = 403, description = "Worker was never offered this request"),
        (status = 409, description = "Already assigned, closed, or already responded")
    )
)]
pub(crate) async fn respond(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<RespondInput>,
) -> Response {
    let id = match parse_id(&id, Some(correlation.0.clone())) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Worker, Some(correlation.0));
    let correlation_id = ctx.correlation_id.clone();
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().respond(&ctx, &id, input)
    })
    .await
    {
        Ok(receipt) => Json(receipt).into_response(),
        Err(err) => map_error(&err, correlation_id),
    }
}

/// Shared front half of the operator endpoints.
fn operator_request(
    correlation: CorrelationId,
    id: &str,
    body: &Bytes,
) -> Result<(RequestContext, RequestId, OperatorInput), Response> {
    let correlation_id = Some(correlation.0);
    let id = parse_id(id, correlation_id.clone())?;
    let input = parse_operator_input(body, correlation_id.clone())?;
    tracing::info!(request_id = %id, note = input.note.is_some(), "operator action");
    Ok((RequestContext::new(EventSource::Operator, correlation_id), id, input))
}

#[utoipa::path(
    post,
    path = "/api/emergencies/{id}/dispatch",
    params(
        ("id" = String, Path, description = "Emergency request ID"),
        ("x-operator" = String, Header, description = "Must be `true`")
    ),
    request_body(content = OperatorInput, description = "Optional operator note"),
    responses((status = 200, body = IntakeReceipt), (status = 403), (status = 422))
)]
pub(crate) async fn dispatch(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    _operator: Operator,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let (ctx, id, input) = match operator_request(correlation, &id, &body) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let correlation_id = ctx.correlation_id.clone();
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().dispatch(&ctx, &id, input)
    })
    .await
    {
        Ok(value) => Json(value).into_response(),
        Err(err) => map_error(&err, correlation_id),
    }
}

#[utoipa::path(
    post,
    path = "/api/emergencies/{id}/escalate",
    params(
        ("id" = String, Path, description = "Emergency request ID"),
        ("x-operator" = String, Header, description = "Must be `true`")
    ),
    request_body(content = OperatorInput, description = "Optional operator note"),
    responses((status = 200, body = EmergencyRequest), (status = 403), (status = 422))
)]
pub(crate) async fn escalate(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    _operator: Operator,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let (ctx, id, input) = match operator_request(correlation, &id, &body) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let correlation_id = ctx.correlation_id.clone();
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().force_escalate(&ctx, &id, input)
    })
    .await
    {
        Ok(value) => Json(value).into_response(),
        Err(err) => map_error(&err, correlation_id),
    }
}

#[utoipa::path(
    post,
    path = "/api/emergencies/{id}/resolve",
    params(
        ("id" = String, Path, description = "Emergency request ID"),
        ("x-operator" = String, Header, description = "Must be `true`")
    ),
    request_body(content = OperatorInput, description = "Optional operator note"),
    responses((status = 200, body = EmergencyRequest), (status = 403), (status = 422))
)]
pub(crate) async fn resolve(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    _operator: Operator,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let (ctx, id, input) = match operator_request(correlation, &id, &body) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let correlation_id = ctx.correlation_id.clone();
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().force_resolve(&ctx, &id, input)
    })
    .await
    {
        Ok(value) => Json(value).into_response(),
        Err(err) => map_error(&err, correlation_id),
    }
}

#[utoipa::path(
    post,
    path = "/api/emergencies/{id}/cancel",
    params(
        ("id" = String, Path, description = "Emergency request ID"),
        ("x-operator" = String, Header, description = "Must be `true`")
    ),
    request_body(content = OperatorInput, description = "Optional operator note"),
    responses((status = 200, body = EmergencyRequest), (status = 403), (status = 422))
)]
pub(crate) async fn cancel(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    _operator: Operator,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let (ctx, id, input) = match operator_request(correlation, &id, &body) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let correlation_id = ctx.correlation_id.clone();
    match with_dispatcher(&state, move |dispatcher| {
        dispatcher.emergencies().cancel(&ctx, &id, input)
    })
    .await
    {
        Ok(value) => Json(value).into_response(),
        Err(err) => map_error(&err, correlation_id),
    }
}
