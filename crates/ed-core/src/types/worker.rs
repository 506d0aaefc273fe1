use crate::types::ids::{ServiceId, WorkerId};
use crate::types::request::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Read model of a worker's availability, fed by the profile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkerSnapshot {
    pub worker_id: WorkerId,
    pub location: Option<GeoPoint>,
    pub is_available: bool,
    pub services: Vec<ServiceId>,
    pub rating: f64,
    pub updated_at: DateTime<Utc>,
}

impl WorkerSnapshot {
    pub fn offers(&self, service: &ServiceId) -> bool {
        self.services.iter().any(|offered| offered == service)
    }
}
