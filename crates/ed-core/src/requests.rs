use crate::error::EngineError;
use crate::types::io::RequestFilter;
use crate::types::{EmergencyRequest, EscalationReason, RequestId, RequestStatus, StatusNote, WorkerId};
use chrono::{DateTime, Utc};

/// A guarded status update. It applies only while the stored status still
/// equals `expected`, and when `assign` is set only while no worker is
/// assigned yet.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub expected: RequestStatus,
    pub to: RequestStatus,
    pub at: DateTime<Utc>,
    pub assign: Option<WorkerId>,
    pub response_deadline: Option<DateTime<Utc>>,
    pub escalation_reason: Option<EscalationReason>,
    pub note: Option<StatusNote>,
}

impl StatusChange {
    pub fn new(expected: RequestStatus, to: RequestStatus, at: DateTime<Utc>) -> Self {
        Self {
            expected,
            to,
            at,
            assign: None,
            response_deadline: None,
            escalation_reason: None,
            note: None,
        }
    }

    pub fn assign(mut self, worker_id: WorkerId) -> Self {
        self.assign = Some(worker_id);
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.response_deadline = Some(deadline);
        self
    }

    pub fn reason(mut self, reason: EscalationReason) -> Self {
        self.escalation_reason = Some(reason);
        self
    }

    pub fn note(mut self, note: Option<String>) -> Self {
        self.note = note.map(|note| StatusNote {
            at: self.at,
            from: self.expected,
            to: self.to,
            note,
        });
        self
    }
}

pub trait RequestRepository {
    fn create(&self, request: &EmergencyRequest) -> Result<(), EngineError>;
    fn get(&self, id: &RequestId) -> Result<Option<EmergencyRequest>, EngineError>;
    fn list(&self, filter: &RequestFilter) -> Result<Vec<EmergencyRequest>, EngineError>;
    /// Returns the updated request, or `None` when the guard did not match.
    fn transition(
        &self,
        id: &RequestId,
        change: &StatusChange,
    ) -> Result<Option<EmergencyRequest>, EngineError>;
    /// Dispatched requests whose response deadline is at or before `now`.
    fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<RequestId>, EngineError>;
}
