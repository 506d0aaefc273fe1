use crate::types::enums::RequestStatus;
use thiserror::Error;

/// Rejections raised before a request exists.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid coordinates: lat {lat}, lng {lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },
    #[error("invalid urgency level: {value}")]
    InvalidUrgency { value: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("rate limited, retry in {wait_seconds}s")]
    RateLimited { wait_seconds: u64 },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("emergency request not found")]
    NotFound,
    #[error("request already assigned to another worker")]
    AlreadyAssigned,
    #[error("worker was never offered this request")]
    UnknownCandidate,
    #[error("request is closed to responses ({status})")]
    RequestClosed { status: RequestStatus },
    #[error("worker already responded")]
    AlreadyResponded,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            message: err.to_string(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
