pub mod dispatch;
pub mod enums;
pub mod event;
pub mod ids;
pub mod io;
pub mod request;
pub mod worker;

pub use dispatch::{Candidate, DispatchAttempt, DispatchLogEntry};
pub use enums::{AttemptResponse, Decision, EscalationReason, LogEvent, RequestStatus, Urgency};
pub use event::EventBody;
pub use ids::{IdError, RequestId, ServiceId, SiteId, UserId, WorkerId};
pub use request::{EmergencyRequest, GeoPoint, Requester, StatusNote};
pub use worker::WorkerSnapshot;
