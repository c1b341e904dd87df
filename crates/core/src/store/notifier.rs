//! Change notification bus.
//!
//! After any successful mutation the owning table adapter broadcasts a
//! [`ChangeEvent`] so UI-side live queries can re-run without polling.
//! Delivery is synchronous, in-process and fire-and-forget: no replay, no
//! persistence, no guarantee across restarts. Events for one entity kind are
//! delivered in commit order; there is no cross-kind ordering.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::warn;

/// What a mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Update,
    Delete,
    Clear,
}

/// A broadcast after one committed mutation.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Entity kind (table) the mutation touched.
    pub kind: &'static str,
    pub change: ChangeType,
    /// Primary keys affected, when known. `None` for `clear`.
    pub keys: Option<Vec<Value>>,
}

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Process-wide publish/subscribe bus, one per store handle.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Dropping the returned subscription unregisters it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Broadcast an event to all current listeners.
    ///
    /// A panicking listener is isolated: remaining listeners still receive
    /// the event.
    pub fn notify(&self, event: ChangeEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(kind = event.kind, "change listener panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.lock().unwrap().len())
            .finish()
    }
}

/// RAII handle for a registered listener.
pub struct Subscription {
    id: u64,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != self.id);
    }
}
