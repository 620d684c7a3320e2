//! Effect: an eager side-effecting subscriber.
//!
//! An effect runs its body once, synchronously, at creation, and re-runs it
//! whenever a dependency changes. Unlike a derived cell it produces no
//! value; it exists to push reactive state at the outside world (patching
//! output sites, logging, scheduling work).
//!
//! Cleanup: the body may register callbacks with
//! [`on_cleanup`](super::context::on_cleanup), or be constructed with
//! [`Effect::with_cleanup`] and return one. Before every re-run, and once
//! more on disposal, the previous run's cleanups execute in registration
//! order, with the returned cleanup last.
//!
//! An effect that writes the very cell it reads will re-run; the follow-up
//! run starts only after the current run's epilogue (subscription and
//! cleanup bookkeeping) has completed, never reentrantly inside the body.
//! The runtime imposes no iteration cap, so termination of such self-loops
//! is the caller's responsibility.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::context::{self, untracked, CleanupList, ReleaseList};
use super::subscriber::{CleanupFn, NotifyFn, NotifyKind, SubscriberId};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    body: Box<dyn Fn() -> Option<CleanupFn> + Send + Sync>,
    releases: Mutex<ReleaseList>,
    cleanups: Mutex<CleanupList>,
    disposed: AtomicBool,
    /// Body currently executing on this thread.
    running: AtomicBool,
    /// A notification arrived while the body was running; run once more
    /// after the current run's bookkeeping completes.
    rerun_pending: AtomicBool,
    run_count: AtomicUsize,
    /// The re-run callback registered with every dependency.
    notify: OnceLock<NotifyFn>,
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// The handle doubles as the disposer; cloning shares state. Dropping all
/// handles without calling [`Effect::dispose`] leaves the effect live, like
/// an undisposed subscription.
///
/// # Example
///
/// ```rust,ignore
/// let count = Cell::new(0);
/// let effect = Effect::new(move || {
///     println!("count is {}", count.get());
/// });
/// count.set(5); // prints "count is 5"
/// effect.dispose();
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it immediately to establish its initial
    /// dependencies.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Box::new(move || {
            body();
            None
        }))
    }

    /// Like [`Effect::new`], but the body returns a cleanup closure that
    /// runs before the next re-run and on disposal.
    pub fn with_cleanup<F, C>(body: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::build(Box::new(move || Some(Box::new(body()) as CleanupFn)))
    }

    fn build(body: Box<dyn Fn() -> Option<CleanupFn> + Send + Sync>) -> Self {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            subscriber_id: SubscriberId::new(),
            body,
            releases: Mutex::new(ReleaseList::new()),
            cleanups: Mutex::new(CleanupList::new()),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            rerun_pending: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            notify: OnceLock::new(),
        });

        let weak: Weak<EffectInner> = Arc::downgrade(&inner);
        let notify: NotifyFn = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                EffectInner::execute(&inner);
            }
        });
        let _ = inner.notify.set(notify);

        EffectInner::execute(&inner);
        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Stop future re-runs, release all subscriptions, and run the last
    /// run's cleanups. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(effect = self.inner.id, "effect disposed");
        for release in std::mem::take(&mut *self.inner.releases.lock()) {
            release();
        }
        for cleanup in std::mem::take(&mut *self.inner.cleanups.lock()) {
            cleanup();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }
}

impl EffectInner {
    fn execute(inner: &Arc<Self>) {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        if inner.running.swap(true, Ordering::SeqCst) {
            // Notified from inside our own body (a self-write). Running the
            // body reentrantly would let the outer run's epilogue clobber
            // the newer run's releases and cleanups; defer instead and run
            // again once the current run has finished its bookkeeping.
            inner.rerun_pending.store(true, Ordering::SeqCst);
            return;
        }

        struct RunningGuard<'a>(&'a AtomicBool);
        impl Drop for RunningGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _running = RunningGuard(&inner.running);

        loop {
            inner.rerun_pending.store(false, Ordering::SeqCst);

            // Re-establish the dependency set from scratch, then run last
            // run's cleanups before the body.
            for release in std::mem::take(&mut *inner.releases.lock()) {
                release();
            }
            for cleanup in std::mem::take(&mut *inner.cleanups.lock()) {
                cleanup();
            }

            let notify = inner
                .notify
                .get()
                .expect("effect notify initialized at construction")
                .clone();
            let guard = context::enter(inner.subscriber_id, NotifyKind::Run, notify);
            let returned_cleanup = (inner.body)();
            let out = guard.finish();
            inner.run_count.fetch_add(1, Ordering::SeqCst);

            if inner.disposed.load(Ordering::SeqCst) {
                // Disposed from inside the body. `dispose` already drained
                // the stored lists (emptied above), so nothing from this
                // final run may be stored: release its subscriptions and run
                // its cleanups right here.
                for release in out.releases {
                    release();
                }
                for cleanup in out.cleanups {
                    cleanup();
                }
                if let Some(cleanup) = returned_cleanup {
                    cleanup();
                }
                return;
            }

            *inner.releases.lock() = out.releases;
            let mut cleanups = out.cleanups;
            if let Some(cleanup) = returned_cleanup {
                cleanups.push(cleanup);
            }
            *inner.cleanups.lock() = cleanups;
            trace!(effect = inner.id, "effect ran");

            if !inner.rerun_pending.swap(false, Ordering::SeqCst) {
                return;
            }
        }
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Run `f` exactly once, untracked, inside an effect frame.
///
/// Reads inside `f` establish no dependencies, so the effect never re-runs;
/// cleanups registered with `on_cleanup` (and nothing else) fire when the
/// returned handle is disposed.
pub fn on_mount<F>(f: F) -> Effect
where
    F: FnOnce() + Send + 'static,
{
    let slot = Mutex::new(Some(f));
    Effect::new(move || {
        if let Some(f) = slot.lock().take() {
            untracked(f);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::cell::Cell;
    use crate::reactive::context::on_cleanup;
    use crate::reactive::Derived;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_once_at_creation() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_on_dependency_change() {
        let cell = Cell::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let cell_clone = cell.clone();
        let seen_clone = seen.clone();
        let effect = Effect::new(move || {
            seen_clone.store(cell_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 0);

        cell.set(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_through_derived_chain() {
        let cell = Cell::new(1);
        let cell_clone = cell.clone();
        let doubled = Derived::new(move || cell_clone.get() * 2);

        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();
        let _effect = Effect::new(move || {
            seen_clone.store(doubled.get(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        cell.set(3);
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn returned_cleanup_runs_before_rerun_and_on_dispose() {
        let cell = Cell::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let cleanups_clone = cleanups.clone();
        let effect = Effect::with_cleanup(move || {
            let _ = cell_clone.get();
            let c = cleanups_clone.clone();
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        cell.set(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);

        // Idempotent: a second dispose runs nothing.
        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cleanups_run_in_registration_order_before_the_body() {
        let cell = Cell::new(0);
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let cell_clone = cell.clone();
        let log_clone = log.clone();
        let _effect = Effect::new(move || {
            let _ = cell_clone.get();
            log_clone.lock().push("body");
            let l = log_clone.clone();
            on_cleanup(move || l.lock().push("a"));
            let l = log_clone.clone();
            on_cleanup(move || l.lock().push("b"));
        });

        cell.set(1);
        assert_eq!(*log.lock(), vec!["body", "a", "b", "body"]);
    }

    #[test]
    fn disposed_effect_stops_rerunning() {
        let cell = Cell::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            let _ = cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert!(effect.is_disposed());

        cell.set(1);
        cell.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn effect_writing_an_unrelated_cell_cascades() {
        let input = Cell::new(1);
        let output = Cell::new(0);

        let (i, o) = (input.clone(), output.clone());
        let _forward = Effect::new(move || {
            o.set(i.get() * 10);
        });

        let seen = Arc::new(AtomicI32::new(-1));
        let (o, s) = (output.clone(), seen.clone());
        let _watch = Effect::new(move || {
            s.store(o.get(), Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 10);
        input.set(5);
        assert_eq!(seen.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let tracked = Cell::new(0);
        let peeked = Cell::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let (t, p, r) = (tracked.clone(), peeked.clone(), runs.clone());
        let _effect = Effect::new(move || {
            let _ = t.get();
            let _ = untracked(|| p.get());
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        peeked.set(9);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tracked.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn self_write_reruns_after_the_current_run_completes() {
        let cell = Cell::new(0);
        let runs = Arc::new(AtomicI32::new(0));

        let (c, r) = (cell.clone(), runs.clone());
        let effect = Effect::new(move || {
            let v = c.get();
            r.fetch_add(1, Ordering::SeqCst);
            if v == 0 {
                c.set(1);
            }
        });

        // First run writes the cell it reads; the follow-up run sees the
        // new value and stops. Exactly two runs, not a reentrant pile-up.
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cell.get_untracked(), 1);

        cell.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        drop(effect);
    }

    #[test]
    fn self_write_runs_every_cleanup_exactly_once() {
        let cell = Cell::new(0);
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let (c, l) = (cell.clone(), log.clone());
        let effect = Effect::with_cleanup(move || {
            let v = c.get();
            l.lock().push(format!("run {v}"));
            if v == 0 {
                c.set(1);
            }
            let l = l.clone();
            move || l.lock().push(format!("clean {v}"))
        });

        effect.dispose();
        // The superseded run's cleanup fires before the follow-up body; the
        // final run's cleanup fires on dispose, never dropped.
        assert_eq!(
            *log.lock(),
            vec!["run 0", "clean 0", "run 1", "clean 1"]
        );
    }

    #[test]
    fn self_write_releases_the_superseded_runs_subscriptions() {
        let gate = Cell::new(0);
        let once = Cell::new(100);
        let runs = Arc::new(AtomicI32::new(0));

        let (g, o, r) = (gate.clone(), once.clone(), runs.clone());
        let effect = Effect::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
            if g.get() == 0 {
                let _ = o.get();
                g.set(1);
            }
        });

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(once.subscriber_count(), 0);

        // Only the superseded first run read `once`; a write to it must
        // not re-trigger the effect.
        once.set(101);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        drop(effect);
    }

    #[test]
    fn dispose_from_inside_the_body_runs_the_final_cleanup() {
        let cell = Cell::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));
        let slot: Arc<parking_lot::Mutex<Option<Effect>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let (c, cl, s) = (cell.clone(), cleanups.clone(), slot.clone());
        let effect = Effect::with_cleanup(move || {
            if c.get() == 1 {
                if let Some(handle) = s.lock().take() {
                    handle.dispose();
                }
            }
            let cl = cl.clone();
            move || {
                cl.fetch_add(1, Ordering::SeqCst);
            }
        });
        *slot.lock() = Some(effect.clone());

        cell.set(1);

        // Both the first run's cleanup (before the re-run) and the final
        // run's cleanup (at self-disposal) fired, and nothing is left
        // subscribed.
        assert!(effect.is_disposed());
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(cell.subscriber_count(), 0);

        cell.set(2);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn on_mount_runs_once_and_cleans_up_on_dispose() {
        let cell = Cell::new(0);
        let runs = Arc::new(AtomicI32::new(0));
        let cleaned = Arc::new(AtomicI32::new(0));

        let (c, r, cl) = (cell.clone(), runs.clone(), cleaned.clone());
        let handle = on_mount(move || {
            let _ = c.get(); // untracked: never re-triggers
            r.fetch_add(1, Ordering::SeqCst);
            let cl = cl.clone();
            on_cleanup(move || {
                cl.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cell.set(7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);

        handle.dispose();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }
}
