use crate::types::enums::{AttemptResponse, EscalationReason, RequestStatus, Urgency};
use crate::types::ids::{RequestId, WorkerId};
use crate::types::request::EmergencyRequest;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    EmergencyCreated {
        request: EmergencyRequest,
    },
    CandidateNotified {
        request_id: RequestId,
        worker_id: WorkerId,
        distance_km: f64,
        urgency: Urgency,
    },
    DispatchStatusChanged {
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },
    WorkerResponded {
        request_id: RequestId,
        worker_id: WorkerId,
        response: AttemptResponse,
    },
    WorkerAssigned {
        request_id: RequestId,
        worker_id: WorkerId,
    },
    RequestEscalated {
        request_id: RequestId,
        reason: EscalationReason,
    },
}

impl EventBody {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::EmergencyCreated { request } => &request.id,
            Self::CandidateNotified { request_id, .. }
            | Self::DispatchStatusChanged { request_id, .. }
            | Self::WorkerResponded { request_id, .. }
            | Self::WorkerAssigned { request_id, .. }
            | Self::RequestEscalated { request_id, .. } => request_id,
        }
    }

    pub fn status_changed(request_id: &RequestId, from: RequestStatus, to: RequestStatus) -> Self {
        Self::DispatchStatusChanged {
            request_id: request_id.clone(),
            from,
            to,
        }
    }
}
