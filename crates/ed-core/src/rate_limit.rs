use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use utoipa::ToSchema;

const KEY_PREFIX: &str = "emergency_rate_limit";
const ATTEMPTS_PREFIX: &str = "emergency_attempts";
const ATTEMPT_HISTORY_LEN: usize = 100;
const ATTEMPT_HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u32,
    pub remaining: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttemptMark {
    pub at: DateTime<Utc>,
    pub admitted: bool,
}

/// Shared counting store. The engine never owns it exclusively.
pub trait CounterStore: Send + Sync {
    /// Counts one hit against `key`, opening a window of `window` when none is live.
    fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, CounterError>;

    fn push_attempt(
        &self,
        key: &str,
        mark: AttemptMark,
        keep: usize,
        ttl: Duration,
    ) -> Result<(), CounterError>;

    fn attempts(&self, key: &str) -> Result<Vec<AttemptMark>, CounterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { wait_seconds: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    window: Duration,
    max_per_window: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, window: Duration, max_per_window: u32) -> Self {
        Self {
            store,
            window,
            max_per_window: max_per_window.max(1),
        }
    }

    pub fn in_memory(window: Duration, max_per_window: u32) -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()), window, max_per_window)
    }

    /// Fails open: a broken store admits the caller.
    pub fn admit(&self, identifier: &str) -> Admission {
        let key = format!("{KEY_PREFIX}:{identifier}");
        match self.store.increment(&key, self.window) {
            Ok(count) if count.count > self.max_per_window => {
                let wait_seconds = count.remaining.as_secs_f64().ceil().max(1.0) as u64;
                tracing::debug!(identifier, count = count.count, wait_seconds, "rate limited");
                Admission::Limited { wait_seconds }
            }
            Ok(_) => Admission::Allowed,
            Err(err) => {
                tracing::warn!(identifier, error = %err, "rate limit store unavailable, admitting");
                Admission::Allowed
            }
        }
    }

    /// Best effort; errors are logged and dropped.
    pub fn record_attempt(&self, identifier: &str, admitted: bool) {
        let key = format!("{ATTEMPTS_PREFIX}:{identifier}");
        let mark = AttemptMark {
            at: Utc::now(),
            admitted,
        };
        if let Err(err) =
            self.store
                .push_attempt(&key, mark, ATTEMPT_HISTORY_LEN, ATTEMPT_HISTORY_TTL)
        {
            tracing::debug!(identifier, error = %err, "attempt history not recorded");
        }
    }

    pub fn recent_attempts(&self, identifier: &str) -> Result<Vec<AttemptMark>, CounterError> {
        self.store
            .attempts(&format!("{ATTEMPTS_PREFIX}:{identifier}"))
    }
}

struct Window {
    count: u32,
    expires_at: Instant,
}

struct History {
    marks: VecDeque<AttemptMark>,
    expires_at: Instant,
}

/// Process-local store on tokio's clock.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
    history: Mutex<HashMap<String, History>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live plus not-yet-pruned keys, as (windows, attempt histories).
    pub fn tracked_keys(&self) -> (usize, usize) {
        let windows = self.windows.lock().map(|map| map.len()).unwrap_or(0);
        let history = self.history.lock().map(|map| map.len()).unwrap_or(0);
        (windows, history)
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, CounterError> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;
        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, entry| entry.expires_at > now);
        }
        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count = entry.count.saturating_add(1);
        Ok(WindowCount {
            count: entry.count,
            remaining: entry.expires_at.saturating_duration_since(now),
        })
    }

    fn push_attempt(
        &self,
        key: &str,
        mark: AttemptMark,
        keep: usize,
        ttl: Duration,
    ) -> Result<(), CounterError> {
        let now = Instant::now();
        let mut history = self
            .history
            .lock()
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;
        if history.len() > PRUNE_THRESHOLD {
            history.retain(|_, entry| entry.expires_at > now);
        }
        let entry = history.entry(key.to_string()).or_insert(History {
            marks: VecDeque::new(),
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.marks.clear();
        }
        entry.expires_at = now + ttl;
        entry.marks.push_back(mark);
        while entry.marks.len() > keep {
            entry.marks.pop_front();
        }
        Ok(())
    }

    fn attempts(&self, key: &str) -> Result<Vec<AttemptMark>, CounterError> {
        let now = Instant::now();
        let history = self
            .history
            .lock()
            .map_err(|err| CounterError::Unavailable(err.to_string()))?;
        Ok(history
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.marks.iter().cloned().collect())
            .unwrap_or_default())
    }
}
