//! Registry of callbacks invoked after every redistribution.
//!
//! Structures that cache row locations (cursors, neighbour lists, iteration
//! plans) go stale the moment rows migrate. They register here and are
//! notified once per completed redistribution, after the partition map and
//! row placement have both settled.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

struct Inner {
    next_id: u64,
    callbacks: BTreeMap<u64, Box<dyn FnMut() + Send>>,
}

/// Subscription registry for structures that must refresh after rows move.
pub struct DependentRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl Default for DependentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DependentRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                callbacks: BTreeMap::new(),
            })),
        }
    }

    /// Register a callback to run after each redistribution. Dropping the
    /// returned guard unsubscribes it.
    pub fn subscribe(&self, callback: impl FnMut() + Send + 'static) -> DependentGuard {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.callbacks.insert(id, Box::new(callback));
        debug!(id, "dependent subscribed");
        DependentGuard {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every live callback, in subscription order.
    pub fn notify_all(&self) {
        let mut inner = self.inner.lock();
        for callback in inner.callbacks.values_mut() {
            callback();
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unsubscribes its callback when dropped.
pub struct DependentGuard {
    id: u64,
    registry: Weak<Mutex<Inner>>,
}

impl Drop for DependentGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.lock().callbacks.remove(&self.id);
            debug!(id = self.id, "dependent unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let registry = DependentRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = {
            let hits = Arc::clone(&hits);
            registry.subscribe(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let b = {
            let hits = Arc::clone(&hits);
            registry.subscribe(move || {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };

        registry.notify_all();
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        drop(a);
        drop(b);
    }

    #[test]
    fn test_dropped_guard_unsubscribes() {
        let registry = DependentRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let guard = {
            let hits = Arc::clone(&hits);
            registry.subscribe(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert_eq!(registry.len(), 0);

        registry.notify_all();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_runs_in_subscription_order() {
        let registry = DependentRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let guards: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                registry.subscribe(move || order.lock().push(i))
            })
            .collect();

        registry.notify_all();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        drop(guards);
    }
}
