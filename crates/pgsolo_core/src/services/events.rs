//! Synchronous publish/subscribe for client lifecycle events.

use crate::models::{ClientEvent, EventPayload};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with the payload of an event.
pub type EventHandler = dyn Fn(&EventPayload<'_>) + Send + Sync;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Arc<EventHandler>,
    /// Set for `once` handlers; cleared by whichever delivery claims it first.
    pending_once: Option<Arc<AtomicBool>>,
}

/// Registry of event handlers.
///
/// Handlers run synchronously, in registration order, on the publishing task. A
/// panicking handler is logged and skipped; the remaining handlers still run.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<ClientEvent, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every future occurrence of `event`.
    pub fn subscribe<F>(&self, event: ClientEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        self.register(event, Arc::new(handler), None)
    }

    /// Register a handler for the next occurrence of `event` only.
    pub fn once<F>(&self, event: ClientEvent, handler: F) -> SubscriptionId
    where
        F: Fn(&EventPayload<'_>) + Send + Sync + 'static,
    {
        self.register(event, Arc::new(handler), Some(Arc::new(AtomicBool::new(true))))
    }

    fn register(
        &self,
        event: ClientEvent,
        handler: Arc<EventHandler>,
        pending_once: Option<Arc<AtomicBool>>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(event)
            .or_default()
            .push(Subscription { id, handler, pending_once });
        tracing::trace!(event = %event, subscription = id.0, "Handler registered");
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for subs in handlers.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every handler for `event`.
    pub fn clear(&self, event: ClientEvent) {
        self.handlers.write().remove(&event);
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: ClientEvent) -> usize {
        self.handlers.read().get(&event).map_or(0, Vec::len)
    }

    /// Deliver `payload` to every handler of `event`.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while running. Returns the number of handlers invoked.
    pub fn publish(&self, event: ClientEvent, payload: &EventPayload<'_>) -> usize {
        let snapshot: Vec<Subscription> = match self.handlers.read().get(&event) {
            Some(subs) if !subs.is_empty() => subs.clone(),
            _ => return 0,
        };

        let mut delivered = 0;
        let mut spent = Vec::new();
        for sub in &snapshot {
            if let Some(pending) = &sub.pending_once {
                if !pending.swap(false, Ordering::AcqRel) {
                    continue;
                }
                spent.push(sub.id);
            }

            delivered += 1;
            if catch_unwind(AssertUnwindSafe(|| (sub.handler)(payload))).is_err() {
                tracing::warn!(
                    event = %event,
                    subscription = sub.id.0,
                    "Event handler panicked; continuing with remaining handlers"
                );
            }
        }

        for id in spent {
            self.unsubscribe(id);
        }
        delivered
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let counts: HashMap<ClientEvent, usize> =
            handlers.iter().map(|(event, subs)| (*event, subs.len())).collect();
        f.debug_struct("EventDispatcher").field("handlers", &counts).finish()
    }
}
