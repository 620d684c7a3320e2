//! Subscriber identity and subscriber sets.
//!
//! A subscriber is any computation that must re-run (or re-validate) when a
//! reactive value changes: a derived cell, an effect, or a manual
//! subscription. Subscribers are identity-compared through their
//! [`SubscriberId`]; a subscriber is never registered twice against the same
//! cell because subscriber sets are keyed maps, not lists.
//!
//! Subscribers come in two flavors, captured by [`NotifyKind`]:
//!
//! - `Invalidate`: derived cells. Invoked synchronously when an upstream
//!   value changes, so the entire downstream derived graph is marked dirty
//!   before any side effect observes it.
//! - `Run`: effects and manual subscriptions. Deferred through the batch
//!   pending queue and deduplicated, so they run after invalidation has
//!   settled and at most once per flush round.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::batch;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a subscriber reacts to a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// Mark-dirty propagation, invoked synchronously during the write.
    Invalidate,
    /// Re-execution, deferred through the batch pending queue.
    Run,
}

/// Notification callback shared between a subscriber and every cell it reads.
pub type NotifyFn = Arc<dyn Fn() + Send + Sync>;

/// A cleanup registered during a derivation/effect run, consumed on re-run
/// or disposal.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// A hook that removes one subscription, consumed before the next run.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// An ordered, deduplicated set of subscribers attached to one cell.
///
/// Iteration order is insertion order, which is the order notifications are
/// delivered in. Cloning shares the underlying set.
#[derive(Clone, Default)]
pub struct SubscriberSet {
    entries: Arc<RwLock<IndexMap<SubscriberId, (NotifyKind, NotifyFn)>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Re-registering an existing ID keeps its
    /// original position in the notification order.
    pub fn insert(&self, id: SubscriberId, kind: NotifyKind, notify: NotifyFn) {
        self.entries.write().insert(id, (kind, notify));
    }

    /// Remove a subscriber. Missing IDs are a no-op.
    pub fn remove(&self, id: SubscriberId) {
        self.entries.write().shift_remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Notify every current subscriber of a change.
    ///
    /// Invalidations run first and synchronously (they cascade through
    /// derived cells), then runnable subscribers are handed to the batch
    /// queue. The snapshot is taken before any callback is invoked, so
    /// callbacks are free to resubscribe or unsubscribe.
    ///
    /// This never flushes the pending queue; the write entry point does,
    /// once the full invalidation cascade has settled.
    pub(crate) fn dispatch(&self) {
        let snapshot: Vec<(SubscriberId, NotifyKind, NotifyFn)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .map(|(id, (kind, f))| (*id, *kind, f.clone()))
                .collect()
        };

        for (_, kind, f) in &snapshot {
            if *kind == NotifyKind::Invalidate {
                f();
            }
        }
        for (id, kind, f) in snapshot {
            if kind == NotifyKind::Run {
                batch::deliver(id, f);
            }
        }
    }
}

/// Handle returned by `subscribe`; revokes the subscription when consumed.
pub struct Subscription {
    set: SubscriberSet,
    id: SubscriberId,
}

impl Subscription {
    pub(crate) fn new(set: SubscriberSet, id: SubscriberId) -> Self {
        Self { set, id }
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        self.set.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn set_deduplicates_by_id() {
        let set = SubscriberSet::new();
        let id = SubscriberId::new();

        set.insert(id, NotifyKind::Run, Arc::new(|| {}));
        set.insert(id, NotifyKind::Run, Arc::new(|| {}));

        assert_eq!(set.len(), 1);

        set.remove(id);
        assert!(set.is_empty());
    }

    #[test]
    fn dispatch_runs_invalidations_before_runs() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let set = SubscriberSet::new();

        let o = order.clone();
        set.insert(
            SubscriberId::new(),
            NotifyKind::Run,
            Arc::new(move || o.lock().push("run")),
        );
        let o = order.clone();
        set.insert(
            SubscriberId::new(),
            NotifyKind::Invalidate,
            Arc::new(move || o.lock().push("invalidate")),
        );

        set.dispatch();
        super::batch::flush_if_idle();

        assert_eq!(*order.lock(), vec!["invalidate", "run"]);
    }

    #[test]
    fn dispatch_tolerates_reentrant_removal() {
        let set = SubscriberSet::new();
        let id = SubscriberId::new();
        let hits = Arc::new(AtomicI32::new(0));

        let inner_set = set.clone();
        let inner_hits = hits.clone();
        set.insert(
            id,
            NotifyKind::Invalidate,
            Arc::new(move || {
                inner_hits.fetch_add(1, Ordering::SeqCst);
                inner_set.remove(id);
            }),
        );

        set.dispatch();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }
}
