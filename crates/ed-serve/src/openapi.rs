use utoipa::OpenApi;

use crate::routes::emergencies::ListQuery;
use crate::routes::events::EventsQuery;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use ed_core::rate_limit::AttemptMark;
use ed_core::types::enums::{
    AttemptResponse, Decision, EscalationReason, LogEvent, RequestStatus, Urgency,
};
use ed_core::types::io::{
    CreateEmergencyInput, IntakeReceipt, OperatorInput, RequestDetail, RequestFilter,
    RespondInput, ResponseReceipt, UpsertWorkerInput,
};
use ed_core::types::{
    DispatchAttempt, DispatchLogEntry, EmergencyRequest, EventBody, GeoPoint, RequestId, Requester,
    ServiceId, SiteId, StatusNote, UserId, WorkerId, WorkerSnapshot,
};
use ed_events::types::{EventRecord, EventSource};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::emergencies::create_emergency,
        crate::routes::emergencies::list_emergencies,
        crate::routes::emergencies::get_emergency,
        crate::routes::emergencies::list_attempts,
        crate::routes::emergencies::respond,
        crate::routes::emergencies::dispatch,
        crate::routes::emergencies::escalate,
        crate::routes::emergencies::resolve,
        crate::routes::emergencies::cancel,
        crate::routes::workers::put_availability,
        crate::routes::workers::get_availability,
        crate::routes::rate_limit::recent_attempts,
        crate::routes::events::list_events,
        crate::routes::events::subscribe
    ),
    components(schemas(
        EmergencyRequest,
        RequestDetail,
        Requester,
        StatusNote,
        GeoPoint,
        DispatchAttempt,
        DispatchLogEntry,
        WorkerSnapshot,
        CreateEmergencyInput,
        RespondInput,
        OperatorInput,
        RequestFilter,
        UpsertWorkerInput,
        IntakeReceipt,
        ResponseReceipt,
        ListQuery,
        EventsQuery,
        AttemptMark,
        RequestId,
        UserId,
        WorkerId,
        ServiceId,
        SiteId,
        RequestStatus,
        Urgency,
        AttemptResponse,
        Decision,
        EscalationReason,
        LogEvent,
        EventBody,
        EventRecord,
        EventSource
    )),
    info(title = "Emergency Dispatch API")
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Emergency Dispatch API</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
      window.ui = SwaggerUIBundle({ url: '/api/openapi.json', dom_id: '#swagger-ui' });
    </script>
  </body>
</html>
"#,
    )
}
