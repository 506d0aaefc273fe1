use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Longest a dispatched request waits for an accept before escalating.
pub const MAX_RESPONSE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub search_radius_km: f64,
    pub max_candidates: usize,
    pub response_timeout: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,
    /// When off, new requests wait in `queued` for an operator dispatch.
    pub auto_dispatch: bool,
    pub sweep_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 5.0,
            max_candidates: 5,
            response_timeout: Duration::from_secs(45),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 1,
            auto_dispatch: true,
            sweep_interval: Duration::from_secs(15),
        }
    }
}

impl DispatchConfig {
    /// Overlays `EMERGENCY_*` variables from `lookup` on top of the defaults.
    /// Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());
        Self {
            search_radius_km: lookup("EMERGENCY_SEARCH_RADIUS_KM")
                .and_then(|value| value.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(defaults.search_radius_km),
            max_candidates: parse_u64("EMERGENCY_MAX_CANDIDATES")
                .filter(|value| *value > 0)
                .map(|value| value as usize)
                .unwrap_or(defaults.max_candidates),
            response_timeout: parse_u64("EMERGENCY_RESPONSE_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .filter(|value| !value.is_zero() && *value <= MAX_RESPONSE_TIMEOUT)
                .unwrap_or(defaults.response_timeout),
            rate_limit_window: parse_u64("EMERGENCY_RATE_LIMIT_WINDOW_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: parse_u64("EMERGENCY_RATE_LIMIT_PER_MINUTE")
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.rate_limit_max),
            auto_dispatch: lookup("EMERGENCY_AUTO_DISPATCH")
                .and_then(|value| parse_bool(&value))
                .unwrap_or(defaults.auto_dispatch),
            sweep_interval: parse_u64("EMERGENCY_SWEEP_INTERVAL_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `response_timeout` capped at [`MAX_RESPONSE_TIMEOUT`].
    pub fn capped_response_timeout(&self) -> Duration {
        self.response_timeout.min(MAX_RESPONSE_TIMEOUT)
    }

    pub fn response_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + TimeDelta::milliseconds(self.capped_response_timeout().as_millis() as i64)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
