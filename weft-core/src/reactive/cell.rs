//! Reactive cell: the fundamental mutable state holder.
//!
//! A cell owns one value and the set of subscribers that depend on it.
//! Reading a cell inside a derivation or effect registers that computation
//! as a subscriber; reading outside any active context registers nothing.
//!
//! Writes use same-value skip semantics: setting a value that is
//! [`SameValue`]-equal to the current one (including `NaN` over `NaN`) is a
//! no-op and notifies nobody. A changed write first cascades invalidation
//! through dependent derived cells, then schedules effects and manual
//! subscriptions through the batch queue.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::batch;
use super::context;
use super::subscriber::{NotifyFn, NotifyKind, SubscriberId, SubscriberSet, Subscription};
use super::value::SameValue;

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A reactive value holder.
///
/// Cloning shares state: clones read and write the same underlying value
/// and subscriber set.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(0);
/// let value = count.get();
/// count.set(5); // notifies subscribers
/// ```
pub struct Cell<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    id: u64,
    value: Arc<RwLock<T>>,
    subscribers: SubscriberSet,
}

impl<T> Cell<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: next_cell_id(),
            value: Arc::new(RwLock::new(value)),
            subscribers: SubscriberSet::new(),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read the current value.
    ///
    /// Inside an active derivation or effect this registers the computation
    /// as a subscriber of this cell.
    pub fn get(&self) -> T {
        context::observe(&self.subscribers);
        self.value.read().clone()
    }

    /// Read the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Write a new value and notify subscribers.
    ///
    /// Skipped entirely when the new value is same-value-equal to the
    /// current one.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.value.write();
            if guard.same_value(&value) {
                return;
            }
            *guard = value;
        }

        trace!(cell = self.id, "cell changed, notifying subscribers");
        self.subscribers.dispatch();
        batch::flush_if_idle();
    }

    /// Update the value from its current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Register a manual change callback. The callback runs after each
    /// changed write (once per batch flush, with the final value readable
    /// through [`Cell::get_untracked`]).
    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let notify: NotifyFn = Arc::new(notify);
        self.subscribers.insert(id, NotifyKind::Run, notify);
        Subscription::new(self.subscribers.clone(), id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + SameValue + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
