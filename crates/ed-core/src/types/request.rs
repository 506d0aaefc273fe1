use crate::types::enums::{EscalationReason, RequestStatus, Urgency};
use crate::types::ids::{RequestId, ServiceId, SiteId, UserId, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Who raised the request. Anonymous callers are identified by phone only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requester {
    User { user_id: UserId },
    Anonymous,
}

impl Requester {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User { user_id } => Some(user_id),
            Self::Anonymous => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusNote {
    pub at: DateTime<Utc>,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EmergencyRequest {
    pub id: RequestId,
    pub requester: Requester,
    pub contact_phone: String,
    pub location: GeoPoint,
    pub address: String,
    pub service_id: Option<ServiceId>,
    pub service_description: Option<String>,
    pub site_id: Option<SiteId>,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub assigned_worker: Option<WorkerId>,
    pub response_deadline: Option<DateTime<Utc>>,
    pub escalation_reason: Option<EscalationReason>,
    pub notes: Vec<StatusNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EmergencyRequest {
    /// Key the rate limiter counts against: the user when authenticated,
    /// otherwise the contact phone.
    pub fn rate_limit_identifier(&self) -> &str {
        match &self.requester {
            Requester::User { user_id } => user_id.as_str(),
            Requester::Anonymous => &self.contact_phone,
        }
    }
}
