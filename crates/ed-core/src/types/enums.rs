use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    #[default]
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Queued,
    Dispatched,
    Accepted,
    DeclinedAll,
    Escalated,
    Resolved,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        Self::Open,
        Self::Queued,
        Self::Dispatched,
        Self::Accepted,
        Self::DeclinedAll,
        Self::Escalated,
        Self::Resolved,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Accepted => "accepted",
            Self::DeclinedAll => "declined_all",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    /// Position in the state graph. Transitions never decrease it.
    pub fn rank(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Queued => 1,
            Self::Dispatched => 2,
            Self::Accepted | Self::DeclinedAll | Self::Escalated => 3,
            Self::Resolved | Self::Cancelled => 4,
        }
    }

    /// Resolved and cancelled are operator-set and never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResponse {
    Pending,
    Accepted,
    Declined,
    TimedOut,
    /// The worker accepted after another worker had already won.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    pub fn response(self) -> AttemptResponse {
        match self {
            Self::Accept => AttemptResponse::Accepted,
            Self::Decline => AttemptResponse::Declined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    Notified,
    Accepted,
    Declined,
    TimedOut,
    Superseded,
}

impl From<AttemptResponse> for LogEvent {
    fn from(value: AttemptResponse) -> Self {
        match value {
            AttemptResponse::Pending => Self::Notified,
            AttemptResponse::Accepted => Self::Accepted,
            AttemptResponse::Declined => Self::Declined,
            AttemptResponse::TimedOut => Self::TimedOut,
            AttemptResponse::Superseded => Self::Superseded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    NoCandidates,
    AvailabilityUnavailable,
    ResponseTimeout,
    Operator,
}
