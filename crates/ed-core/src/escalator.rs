use crate::types::RequestId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Per-request response deadlines. When a watch runs out, its request id is
/// sent once on the channel returned by [`TimeoutEscalator::new`]; the
/// receiver is expected to call `expire` on the dispatcher.
#[derive(Clone)]
pub struct TimeoutEscalator {
    handle: Handle,
    watches: Arc<Watches>,
    fired: mpsc::UnboundedSender<RequestId>,
}

#[derive(Default)]
struct Watches {
    entries: Mutex<HashMap<RequestId, Watch>>,
    next_generation: AtomicU64,
}

struct Watch {
    generation: u64,
    task: AbortHandle,
}

impl Watches {
    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, Watch>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TimeoutEscalator {
    pub fn new(handle: Handle) -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        let (fired, receiver) = mpsc::unbounded_channel();
        let escalator = Self {
            handle,
            watches: Arc::new(Watches::default()),
            fired,
        };
        (escalator, receiver)
    }

    /// Must be called from inside a tokio runtime.
    pub fn current() -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        Self::new(Handle::current())
    }

    /// Arms a deadline for `id`, replacing any earlier one.
    pub fn watch(&self, id: RequestId, after: Duration) {
        let generation = self.watches.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.watches.entries();

        let watches = Arc::clone(&self.watches);
        let fired = self.fired.clone();
        let target = id.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            let due = {
                let mut entries = watches.entries();
                let current = entries
                    .get(&target)
                    .is_some_and(|watch| watch.generation == generation);
                if current {
                    entries.remove(&target);
                }
                current
            };
            if due {
                tracing::debug!(request_id = %target, "response deadline reached");
                let _ = fired.send(target);
            }
        });

        if let Some(previous) = entries.insert(
            id,
            Watch {
                generation,
                task: task.abort_handle(),
            },
        ) {
            previous.task.abort();
        }
    }

    /// Returns whether a watch was outstanding. Safe to call repeatedly.
    pub fn cancel(&self, id: &RequestId) -> bool {
        match self.watches.entries().remove(id) {
            Some(watch) => {
                watch.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, id: &RequestId) -> bool {
        self.watches.entries().contains_key(id)
    }

    pub fn pending(&self) -> usize {
        self.watches.entries().len()
    }
}
