use crate::error::EngineError;
use crate::types::{AttemptResponse, DispatchAttempt, DispatchLogEntry, LogEvent, RequestId, WorkerId};
use chrono::{DateTime, Utc};

pub trait AttemptRepository {
    /// Fails if the (request, worker) pair already has a row.
    fn insert(&self, attempt: &DispatchAttempt) -> Result<(), EngineError>;
    fn get(
        &self,
        request_id: &RequestId,
        worker_id: &WorkerId,
    ) -> Result<Option<DispatchAttempt>, EngineError>;
    fn list(&self, request_id: &RequestId) -> Result<Vec<DispatchAttempt>, EngineError>;
    /// Conditional on the stored response still being `expected`.
    fn set_response(
        &self,
        request_id: &RequestId,
        worker_id: &WorkerId,
        expected: AttemptResponse,
        response: AttemptResponse,
        at: DateTime<Utc>,
    ) -> Result<Option<DispatchAttempt>, EngineError>;
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub request_id: RequestId,
    pub worker_id: WorkerId,
    pub event: LogEvent,
    pub distance_km: f64,
    pub at: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn for_attempt(attempt: &DispatchAttempt, event: LogEvent, at: DateTime<Utc>) -> Self {
        Self {
            request_id: attempt.request_id.clone(),
            worker_id: attempt.worker_id.clone(),
            event,
            distance_km: attempt.distance_km,
            at,
        }
    }
}

/// Append-only; entries are never updated or deleted.
pub trait DispatchLogRepository {
    fn record(&self, entry: NewLogEntry) -> Result<DispatchLogEntry, EngineError>;
    fn history(&self, request_id: &RequestId) -> Result<Vec<DispatchLogEntry>, EngineError>;
}
