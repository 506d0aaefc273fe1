use crate::types::dispatch::{DispatchAttempt, DispatchLogEntry};
use crate::types::enums::{AttemptResponse, Decision, RequestStatus, Urgency};
use crate::types::ids::{RequestId, ServiceId, SiteId, UserId, WorkerId};
use crate::types::request::{EmergencyRequest, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEmergencyInput {
    /// Filled from the authenticated identity, never from the body.
    #[serde(skip)]
    pub requester: Option<UserId>,
    pub contact_phone: String,
    pub location: GeoPoint,
    pub address: String,
    #[serde(default)]
    pub service_id: Option<ServiceId>,
    #[serde(default)]
    pub service_description: Option<String>,
    #[serde(default)]
    pub site_id: Option<SiteId>,
    /// `low`, `medium` or `high`; defaults to `high`.
    #[serde(default)]
    pub urgency_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RespondInput {
    pub worker_id: WorkerId,
    pub decision: Decision,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OperatorInput {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub urgency: Option<Urgency>,
    pub requester: Option<UserId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsertWorkerInput {
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub is_available: bool,
    #[serde(default)]
    pub services: Vec<ServiceId>,
    #[serde(default)]
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IntakeReceipt {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub candidates_notified: usize,
    pub response_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResponseReceipt {
    pub request_id: RequestId,
    pub worker_id: WorkerId,
    pub status: RequestStatus,
    pub response: AttemptResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RequestDetail {
    pub request: EmergencyRequest,
    pub attempts: Vec<DispatchAttempt>,
    pub dispatch_log: Vec<DispatchLogEntry>,
}
