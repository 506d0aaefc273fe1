use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use ed_core::EngineError;
use ed_core::error::{DispatchError, IntakeError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: Option<String>,
}

pub fn error_response(
    status: StatusCode,
    code: &'static str,
    message: String,
    correlation_id: Option<String>,
) -> Response {
    let body = ErrorEnvelope {
        code,
        message,
        correlation_id,
    };
    (status, Json(body)).into_response()
}

pub fn map_error(err: &EngineError, correlation_id: Option<String>) -> Response {
    let (status, code, message) = match err {
        EngineError::Intake(intake) => map_intake_error(intake),
        EngineError::Dispatch(dispatch) => map_dispatch_error(dispatch),
        EngineError::StoreUnavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            err.to_string(),
        ),
        EngineError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            message.clone(),
        ),
    };
    if status.is_server_error() {
        tracing::error!(code, %message, correlation_id = ?correlation_id, "request failed");
    }

    let mut response = error_response(status, code, message, correlation_id);
    if let EngineError::Intake(IntakeError::RateLimited { wait_seconds }) = err {
        if let Ok(value) = HeaderValue::from_str(&wait_seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

pub fn invalid_input(message: impl Into<String>, correlation_id: Option<String>) -> Response {
    map_error(
        &EngineError::Dispatch(DispatchError::InvalidInput {
            message: message.into(),
        }),
        correlation_id,
    )
}

fn map_intake_error(err: &IntakeError) -> (StatusCode, &'static str, String) {
    match err {
        IntakeError::InvalidCoordinates { .. } => (
            StatusCode::BAD_REQUEST,
            "invalid_coordinates",
            err.to_string(),
        ),
        IntakeError::InvalidUrgency { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_urgency", err.to_string())
        }
        IntakeError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        IntakeError::RateLimited { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "rate_limited", err.to_string())
        }
    }
}

fn map_dispatch_error(err: &DispatchError) -> (StatusCode, &'static str, String) {
    match err {
        DispatchError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        DispatchError::AlreadyAssigned => {
            (StatusCode::CONFLICT, "already_assigned", err.to_string())
        }
        DispatchError::UnknownCandidate => {
            (StatusCode::FORBIDDEN, "unknown_candidate", err.to_string())
        }
        DispatchError::RequestClosed { .. } => {
            (StatusCode::CONFLICT, "request_closed", err.to_string())
        }
        DispatchError::AlreadyResponded => {
            (StatusCode::CONFLICT, "already_responded", err.to_string())
        }
        DispatchError::InvalidTransition { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_state",
            err.to_string(),
        ),
        DispatchError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
    }
}
