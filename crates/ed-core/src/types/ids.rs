use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use utoipa::ToSchema;

/// Engine-issued request identifier, `emr_` followed by a ULID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(as = String)]
pub struct RequestId(String);

/// Worker reference owned by the external profile store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(as = String)]
pub struct WorkerId(String);

/// Authenticated requester reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(as = String)]
pub struct UserId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(as = String)]
pub struct ServiceId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(as = String)]
pub struct SiteId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    InvalidPrefix { expected: &'static str, got: String },
    InvalidUlid { value: String },
    InvalidFormat { value: String },
    Empty,
    TooLong { max: usize },
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrefix { expected, got } => {
                write!(f, "invalid prefix: expected {expected}, got {got}")
            }
            Self::InvalidUlid { value } => write!(f, "invalid ulid: {value}"),
            Self::InvalidFormat { value } => write!(f, "invalid id format: {value}"),
            Self::Empty => write!(f, "id must not be empty"),
            Self::TooLong { max } => write!(f, "id longer than {max} characters"),
        }
    }
}

impl std::error::Error for IdError {}

const MAX_EXTERNAL_ID_LEN: usize = 64;

fn validate_prefixed(value: &str, prefix: &'static str) -> Result<(), IdError> {
    let Some(rest) = value.strip_prefix(prefix) else {
        let got = value.split('_').next().unwrap_or("").to_string();
        return Err(IdError::InvalidPrefix {
            expected: prefix,
            got,
        });
    };
    if rest.len() != 26 {
        return Err(IdError::InvalidFormat {
            value: value.to_string(),
        });
    }
    Ulid::from_str(rest).map_err(|_| IdError::InvalidUlid {
        value: value.to_string(),
    })?;
    Ok(())
}

fn validate_external(value: &str) -> Result<(), IdError> {
    if value.trim().is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > MAX_EXTERNAL_ID_LEN {
        return Err(IdError::TooLong {
            max: MAX_EXTERNAL_ID_LEN,
        });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(IdError::InvalidFormat {
            value: value.to_string(),
        });
    }
    Ok(())
}

macro_rules! id_common {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                Self::new(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

macro_rules! prefixed_id {
    ($name:ident, $prefix:expr) => {
        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn new(value: String) -> Result<Self, IdError> {
                validate_prefixed(&value, Self::PREFIX)?;
                Ok(Self(value))
            }

            pub fn generate() -> Self {
                Self(format!("{}{}", Self::PREFIX, Ulid::new()))
            }
        }

        id_common!($name);
    };
}

macro_rules! external_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: String) -> Result<Self, IdError> {
                validate_external(&value)?;
                Ok(Self(value))
            }
        }

        id_common!($name);
    };
}

prefixed_id!(RequestId, "emr_");
external_id!(WorkerId);
external_id!(UserId);
external_id!(ServiceId);
external_id!(SiteId);
