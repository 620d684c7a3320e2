//! Derived cell: a lazily recomputed, cached value.
//!
//! A derived cell owns a derivation closure and is itself a subscriber of
//! every cell (or other derived cell) the closure reads. Evaluation is
//! lazy: the closure runs only on `get()` while the dirty flag is set,
//! never eagerly on a dependency's write. A dependency change merely flips
//! the flag and, on the clean→dirty transition, notifies this cell's *own*
//! subscribers so invalidation cascades down the graph.
//!
//! Every recomputation first releases the subscriptions of the previous run,
//! so the dependency set is exact as of the last evaluation: a derivation
//! that reads different cells on different runs stops being re-triggered by
//! the branches it no longer takes.
//!
//! Laziness is also what makes diamond dependencies consistent: with
//! `D = f(L, R)` and both `L` and `R` reading one source `S`, `D` only
//! recomputes on read, and at read time `L.get()` and `R.get()` both see the
//! same current `S`.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::context::{self, CleanupList, ReleaseList};
use super::subscriber::{NotifyFn, NotifyKind, SubscriberId, SubscriberSet, Subscription};

/// Counter for generating unique derived-cell IDs.
static DERIVED_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_derived_id() -> u64 {
    DERIVED_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct DerivedInner<T> {
    id: u64,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    dirty: AtomicBool,
    subscribers: SubscriberSet,
    releases: Mutex<ReleaseList>,
    cleanups: Mutex<CleanupList>,
    /// The invalidation callback registered with every dependency.
    /// Initialized once, right after construction.
    notify: OnceLock<NotifyFn>,
}

/// A read-only, cached, lazily recomputed reactive value.
///
/// Cloning shares state.
pub struct Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<DerivedInner<T>>,
}

impl<T> Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new derived cell. The derivation does not run until the
    /// first `get()`.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(DerivedInner {
            id: next_derived_id(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            dirty: AtomicBool::new(true),
            subscribers: SubscriberSet::new(),
            releases: Mutex::new(ReleaseList::new()),
            cleanups: Mutex::new(CleanupList::new()),
            notify: OnceLock::new(),
        });

        // Dependencies hold this callback through a weak reference, so a
        // derived cell whose handles are all dropped stops propagating.
        let weak: Weak<DerivedInner<T>> = Arc::downgrade(&inner);
        let notify: NotifyFn = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                DerivedInner::invalidate(&inner);
            }
        });
        let _ = inner.notify.set(notify);

        Self { inner }
    }

    /// Get the derived cell's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Read the current value, recomputing first if a dependency changed
    /// since the last evaluation.
    ///
    /// Inside an active derivation or effect this also registers that
    /// computation as a subscriber of this derived cell.
    pub fn get(&self) -> T {
        context::observe(&self.inner.subscribers);
        if self.inner.dirty.load(Ordering::SeqCst) {
            self.inner.recompute()
        } else {
            self.inner
                .value
                .read()
                .clone()
                .expect("clean derived cell holds a cached value")
        }
    }

    /// Read the current value without establishing a dependency. Still
    /// recomputes if dirty.
    pub fn get_untracked(&self) -> T {
        if self.inner.dirty.load(Ordering::SeqCst) {
            self.inner.recompute()
        } else {
            self.inner
                .value
                .read()
                .clone()
                .expect("clean derived cell holds a cached value")
        }
    }

    /// Whether a dependency has changed since the last evaluation.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Register a manual invalidation callback, invoked when this cell
    /// transitions from clean to dirty.
    pub fn subscribe<F>(&self, notify: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.inner
            .subscribers
            .insert(id, NotifyKind::Run, Arc::new(notify));
        Subscription::new(self.inner.subscribers.clone(), id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl<T> DerivedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Dependency-change callback: flip the dirty flag and cascade. Repeat
    /// notifications while already dirty coalesce into nothing.
    fn invalidate(inner: &Arc<Self>) {
        if !inner.dirty.swap(true, Ordering::SeqCst) {
            trace!(derived = inner.id, "derived invalidated");
            inner.subscribers.dispatch();
        }
    }

    fn recompute(&self) -> T {
        // Drop last run's subscriptions and run its cleanups, so both the
        // dependency set and the cleanup list belong to exactly one run.
        for release in std::mem::take(&mut *self.releases.lock()) {
            release();
        }
        for cleanup in std::mem::take(&mut *self.cleanups.lock()) {
            cleanup();
        }

        let notify = self
            .notify
            .get()
            .expect("derived notify initialized at construction")
            .clone();
        let guard = context::enter(self.subscriber_id, NotifyKind::Invalidate, notify);
        let new_value = (self.compute)();
        let out = guard.finish();

        *self.releases.lock() = out.releases;
        *self.cleanups.lock() = out.cleanups;
        *self.value.write() = Some(new_value.clone());
        self.dirty.store(false, Ordering::SeqCst);
        trace!(derived = self.id, "derived recomputed");

        new_value
    }
}

impl<T> Clone for Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
