use crate::middleware::correlation::CorrelationId;
use crate::routes::error::error_response;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;
use ed_core::types::UserId;

pub const USER_HEADER: &str = "x-user-id";
pub const OPERATOR_HEADER: &str = "x-operator";

/// Identity asserted by the fronting gateway. An absent user header means
/// an anonymous requester.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: Option<UserId>,
    pub operator: bool,
}

/// Caller with the operator role; extraction fails with 403 otherwise.
#[derive(Debug, Clone)]
pub struct Operator(pub Caller);

fn correlation(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<CorrelationId>()
        .map(|value| value.0.clone())
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = match header(parts, USER_HEADER) {
            Some(value) => Some(UserId::new(value.to_string()).map_err(|err| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_input",
                    format!("{USER_HEADER}: {err}"),
                    correlation(parts),
                )
            })?),
            None => None,
        };
        let operator = header(parts, OPERATOR_HEADER)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
        Ok(Self { user_id, operator })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if !caller.operator {
            return Err(error_response(
                StatusCode::FORBIDDEN,
                "forbidden",
                "operator role required".to_string(),
                correlation(parts),
            ));
        }
        Ok(Self(caller))
    }
}
