use crate::types::enums::{AttemptResponse, LogEvent};
use crate::types::ids::{RequestId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One ranked worker. Produced per dispatch and never stored as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Candidate {
    pub worker_id: WorkerId,
    pub distance_km: f64,
    pub rating: f64,
}

/// One row per notified (request, worker) pair. Only `response` and
/// `responded_at` change after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DispatchAttempt {
    pub request_id: RequestId,
    pub worker_id: WorkerId,
    pub distance_km: f64,
    pub rating: f64,
    pub notified_at: DateTime<Utc>,
    pub response: AttemptResponse,
    pub responded_at: Option<DateTime<Utc>>,
}

impl DispatchAttempt {
    pub fn is_pending(&self) -> bool {
        self.response == AttemptResponse::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DispatchLogEntry {
    pub seq: i64,
    pub request_id: RequestId,
    pub worker_id: WorkerId,
    pub event: LogEvent,
    pub distance_km: f64,
    pub at: DateTime<Utc>,
}
