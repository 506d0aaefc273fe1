use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A journaled engine event. `body` holds the serialized domain payload so
/// subscribers outside the core crate can consume it without the core types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventRecord {
    pub id: String,
    pub seq: i64,
    pub at: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub source: EventSource,
    pub body: Value,
}

impl EventRecord {
    /// The `type` tag of the body, if present.
    pub fn kind(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    pub fn payload(&self) -> Option<&Value> {
        self.body.get("payload")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum EventSource {
    Requester,
    Worker,
    Operator,
    Escalator,
}
