//! Subscriber registry: fan transition events out to independent widgets.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use authsync_protocol::TransitionEvent;

/// A registered transition callback.
pub type TransitionHandler = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

/// Identifies one subscription. Ids grow with registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    // BTreeMap keyed by a growing id == registration order.
    by_id: BTreeMap<SubscriptionId, TransitionHandler>,
}

/// Delivers [`TransitionEvent`]s to every registered handler.
///
/// Cheap to clone; clones share the same handler list.
///
/// Delivery is synchronous and in registration order. One handler
/// panicking doesn't stop the others: the panic is caught and logged.
/// Handlers may subscribe or unsubscribe from inside a callback; such
/// changes take effect from the next `publish`.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    handlers: Arc<Mutex<Handlers>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`. Keep the returned [`Subscription`] to be able
    /// to unsubscribe later; dropping it leaves the handler registered.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.lock();
        let id = SubscriptionId(handlers.next_id);
        handlers.next_id += 1;
        handlers.by_id.insert(id, Arc::new(handler));
        tracing::trace!(subscription = %id, "handler subscribed");

        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Calls every handler with `event`. Returns how many completed
    /// without panicking.
    pub fn publish(&self, event: &TransitionEvent) -> usize {
        // Snapshot the list so handlers can (un)subscribe without deadlock.
        let snapshot: Vec<(SubscriptionId, TransitionHandler)> = self
            .lock()
            .by_id
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    tracing::error!(
                        subscription = %id,
                        kind = %event.kind,
                        panic = panic_message(&payload),
                        "transition handler panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    /// `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Handlers> {
        lock(&self.handlers)
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

/// The capability to remove one handler.
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the handler registered forever"]
pub struct Subscription {
    id: SubscriptionId,
    handlers: Weak<Mutex<Handlers>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the handler. Returns `false` if the registry is gone or
    /// the handler was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(handlers) = self.handlers.upgrade() else {
            return false;
        };
        let removed = lock(&handlers).by_id.remove(&self.id).is_some();
        if removed {
            tracing::trace!(subscription = %self.id, "handler unsubscribed");
        }
        removed
    }
}

fn lock(handlers: &Mutex<Handlers>) -> MutexGuard<'_, Handlers> {
    // Handlers run outside the lock, so a poisoned lock can only come from
    // a panic inside insert/remove; the map is still usable.
    handlers.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
