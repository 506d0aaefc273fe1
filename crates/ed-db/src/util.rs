use chrono::{DateTime, SecondsFormat, Utc};
use ed_core::EngineError;
use rusqlite::ErrorCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("json encode failed: {message}")]
    JsonEncode { message: String },
    #[error("json decode failed: {message}")]
    JsonDecode { message: String },
    #[error("invalid enum value: {value}")]
    InvalidEnum { value: String },
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
    #[error("invalid id: {message}")]
    InvalidId { message: String },
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::internal(err)
    }
}

/// Busy or unreachable databases are reported as unavailable; anything the
/// database refused on content is an internal fault.
pub fn sql_err(err: rusqlite::Error) -> EngineError {
    let rejected = matches!(
        &err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    );
    if rejected {
        EngineError::internal(err)
    } else {
        EngineError::store(err)
    }
}

/// Fixed-width UTC so stored timestamps sort lexically.
pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn from_rfc3339(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DbError::InvalidTimestamp {
            value: value.to_string(),
        })
}

pub fn from_rfc3339_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    value.as_deref().map(from_rfc3339).transpose()
}

pub fn encode_json<T: Serialize>(value: &T) -> Result<String, DbError> {
    serde_json::to_string(value).map_err(|err| DbError::JsonEncode {
        message: err.to_string(),
    })
}

pub fn decode_json<T: DeserializeOwned>(value: &str) -> Result<T, DbError> {
    serde_json::from_str(value).map_err(|err| DbError::JsonDecode {
        message: err.to_string(),
    })
}

pub fn encode_enum<T: Serialize>(value: &T) -> Result<String, DbError> {
    let json = serde_json::to_value(value).map_err(|err| DbError::JsonEncode {
        message: err.to_string(),
    })?;
    match json {
        Value::String(value) => Ok(value),
        other => Err(DbError::InvalidEnum {
            value: other.to_string(),
        }),
    }
}

pub fn decode_enum<T: DeserializeOwned>(value: &str) -> Result<T, DbError> {
    serde_json::from_value(Value::String(value.to_string())).map_err(|_| DbError::InvalidEnum {
        value: value.to_string(),
    })
}

pub fn parse_id<T>(value: String) -> Result<T, DbError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| DbError::InvalidId {
        message: err.to_string(),
    })
}
