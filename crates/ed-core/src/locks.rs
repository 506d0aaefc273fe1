use crate::types::RequestId;
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Process-wide mutual exclusion keyed by request. Every state change for a
/// request runs while holding its guard, so decisions about one request are
/// serialized while unrelated requests proceed in parallel.
#[derive(Clone, Default)]
pub struct RequestLocks {
    inner: Arc<LockTable>,
}

#[derive(Default)]
struct LockTable {
    held: Mutex<HashSet<RequestId>>,
    released: Condvar,
}

impl LockTable {
    fn held(&self) -> MutexGuard<'_, HashSet<RequestId>> {
        // A panic while holding the table mutex never leaves the set inconsistent.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other guard for `id` is alive.
    pub fn lock(&self, id: &RequestId) -> RequestGuard {
        let mut held = self.inner.held();
        while held.contains(id) {
            held = self
                .inner
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(id.clone());
        RequestGuard {
            table: Arc::clone(&self.inner),
            id: id.clone(),
        }
    }

    pub fn is_locked(&self, id: &RequestId) -> bool {
        self.inner.held().contains(id)
    }
}

#[must_use]
pub struct RequestGuard {
    table: Arc<LockTable>,
    id: RequestId,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.table.held().remove(&self.id);
        self.table.released.notify_all();
    }
}
