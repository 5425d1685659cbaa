//! Per-connection event handler registry.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use matchwire_shared::{Envelope, EventData};

/// Callback invoked with the `data` of every matching envelope.
///
/// Identity is the `Arc` allocation: registering the same `Handler` twice for
/// one event type keeps a single entry, and [`HandlerRegistry::remove`] needs
/// a clone of the registered `Arc`.
pub type Handler = Arc<dyn Fn(&EventData) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&EventData) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Event type to ordered handler set.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl HandlerRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` if `handler` was already registered for `event_type`.
    pub fn insert(&self, event_type: &str, handler: Handler) -> bool {
        let mut handlers = self.lock();
        let entry = handlers.entry(event_type.to_string()).or_default();
        if entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        entry.push(handler);
        true
    }

    /// Returns `false` if nothing was registered.
    pub fn remove(&self, event_type: &str, handler: &Handler) -> bool {
        let mut handlers = self.lock();
        let Some(entry) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = entry.len() != before;
        if entry.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    pub fn len(&self, event_type: &str) -> usize {
        self.lock().get(event_type).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Handlers for `event_type` in registration order, detached from the lock.
    pub fn snapshot(&self, event_type: &str) -> Vec<Handler> {
        self.lock().get(event_type).cloned().unwrap_or_default()
    }

    /// Deliver `envelope.data` to every handler registered for its type.
    ///
    /// Iterates a snapshot, so handlers may call `insert`/`remove` freely.
    /// Failing or panicking handlers are logged and skipped. `keep_going` is
    /// checked before each call; dispatch stops as soon as it returns false.
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, envelope: &Envelope, keep_going: impl Fn() -> bool) -> usize {
        let mut invoked = 0;
        for handler in self.snapshot(&envelope.event_type) {
            if !keep_going() {
                break;
            }
            invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(&envelope.data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = %envelope.event_type, error = %e, "event handler failed");
                }
                Err(_) => {
                    tracing::warn!(event = %envelope.event_type, "event handler panicked");
                }
            }
        }
        invoked
    }
}
