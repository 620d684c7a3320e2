//! The active reactive context.
//!
//! Dependency tracking is implicit: when a cell is read, the runtime checks
//! which computation is currently executing and registers it as a
//! subscriber. "Which computation is currently executing" is a thread-local
//! stack of frames, pushed around every derivation and effect run. The stack
//! is empty whenever no reactive computation is running, which keeps it
//! trivially resettable between tests.
//!
//! Each tracking frame accumulates two lists during its run:
//!
//! - *releases*: one hook per subscription established during the run. The
//!   owner consumes these before its next run, so the dependency set is
//!   re-established from scratch every time (dependencies may legitimately
//!   differ run to run).
//! - *cleanups*: callbacks registered with [`on_cleanup`], consumed in
//!   registration order before the next run and on disposal.
//!
//! An `Untracked` frame blocks dependency registration without disturbing
//! the frames below it; see [`untracked`].

use std::cell::RefCell;

use smallvec::SmallVec;
use tracing::warn;

use super::subscriber::{CleanupFn, NotifyFn, NotifyKind, ReleaseFn, SubscriberId};

pub(crate) type ReleaseList = SmallVec<[ReleaseFn; 4]>;
pub(crate) type CleanupList = SmallVec<[CleanupFn; 2]>;

enum Frame {
    Tracking(TrackingFrame),
    Untracked,
}

struct TrackingFrame {
    id: SubscriberId,
    kind: NotifyKind,
    notify: NotifyFn,
    releases: ReleaseList,
    cleanups: CleanupList,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// What a finished run collected.
pub(crate) struct ScopeOutput {
    pub releases: ReleaseList,
    pub cleanups: CleanupList,
}

/// Guard for one tracking frame. Popped on [`ScopeGuard::finish`], or on
/// drop if the run unwinds, so a panicking derivation leaves the stack
/// balanced.
pub(crate) struct ScopeGuard {
    id: SubscriberId,
    finished: bool,
}

impl ScopeGuard {
    /// Pop the frame and hand its collected releases/cleanups to the owner.
    pub fn finish(mut self) -> ScopeOutput {
        self.finished = true;
        match pop_frame(self.id) {
            Some(Frame::Tracking(frame)) => ScopeOutput {
                releases: frame.releases,
                cleanups: frame.cleanups,
            },
            _ => ScopeOutput {
                releases: ReleaseList::new(),
                cleanups: CleanupList::new(),
            },
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.finished {
            // Unwinding out of a run: subscriptions made so far stay
            // registered (they are idempotent by ID) and cleanups are lost
            // with the failed run.
            pop_frame(self.id);
        }
    }
}

fn pop_frame(expected: SubscriberId) -> Option<Frame> {
    STACK.with(|stack| {
        let popped = stack.borrow_mut().pop();
        if let Some(Frame::Tracking(frame)) = &popped {
            debug_assert_eq!(
                frame.id, expected,
                "reactive context mismatch: expected {:?}, got {:?}",
                expected, frame.id
            );
        }
        popped
    })
}

/// Enter a tracking frame for the given subscriber.
pub(crate) fn enter(id: SubscriberId, kind: NotifyKind, notify: NotifyFn) -> ScopeGuard {
    STACK.with(|stack| {
        stack.borrow_mut().push(Frame::Tracking(TrackingFrame {
            id,
            kind,
            notify,
            releases: ReleaseList::new(),
            cleanups: CleanupList::new(),
        }));
    });
    ScopeGuard { id, finished: false }
}

/// Register the current tracking frame, if any, with a subscriber set.
///
/// Called by cells and derived cells on read. Also records the matching
/// release hook so the subscription is dropped before the frame owner's
/// next run.
pub(crate) fn observe(subs: &super::subscriber::SubscriberSet) {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(Frame::Tracking(frame)) = stack.last_mut() {
            subs.insert(frame.id, frame.kind, frame.notify.clone());
            let set = subs.clone();
            let id = frame.id;
            frame.releases.push(Box::new(move || set.remove(id)));
        }
    });
}

/// Whether a read at this point would register a dependency.
pub fn is_tracking() -> bool {
    STACK.with(|stack| matches!(stack.borrow().last(), Some(Frame::Tracking(_))))
}

/// Current depth of the context stack. Zero outside any derivation or
/// effect run.
pub fn context_depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

/// Run `f` without registering dependencies, even inside an active
/// derivation or effect.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct UntrackedGuard;
    impl Drop for UntrackedGuard {
        fn drop(&mut self) {
            STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }

    STACK.with(|stack| stack.borrow_mut().push(Frame::Untracked));
    let _guard = UntrackedGuard;
    f()
}

/// Register a cleanup with the nearest enclosing derivation or effect run.
///
/// Cleanups run in registration order before the owner's next run and on
/// disposal. Outside any run the callback is dropped with a warning.
///
/// The nearest *tracking* frame is used, skipping `untracked` frames, so
/// cleanups registered inside `untracked` (e.g. from `on_mount`) still
/// attach to the surrounding effect.
pub fn on_cleanup<F: FnOnce() + Send + 'static>(f: F) {
    let attached = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        for frame in stack.iter_mut().rev() {
            if let Frame::Tracking(frame) = frame {
                frame.cleanups.push(Box::new(f));
                return true;
            }
        }
        false
    });
    if !attached {
        warn!("on_cleanup called outside a reactive computation; callback dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::SubscriberSet;
    use std::sync::Arc;

    fn noop() -> NotifyFn {
        Arc::new(|| {})
    }

    #[test]
    fn tracking_state_follows_frames() {
        assert!(!is_tracking());
        assert_eq!(context_depth(), 0);

        {
            let guard = enter(SubscriberId::new(), NotifyKind::Run, noop());
            assert!(is_tracking());
            assert_eq!(context_depth(), 1);
            guard.finish();
        }

        assert!(!is_tracking());
        assert_eq!(context_depth(), 0);
    }

    #[test]
    fn nested_frames_restore_outer() {
        let guard1 = enter(SubscriberId::new(), NotifyKind::Run, noop());
        {
            let guard2 = enter(SubscriberId::new(), NotifyKind::Invalidate, noop());
            assert_eq!(context_depth(), 2);
            guard2.finish();
        }
        assert_eq!(context_depth(), 1);
        guard1.finish();
    }

    #[test]
    fn observe_collects_release_hooks() {
        let subs = SubscriberSet::new();
        let guard = enter(SubscriberId::new(), NotifyKind::Run, noop());

        observe(&subs);
        observe(&subs); // same frame, same ID: still one entry
        assert_eq!(subs.len(), 1);

        let out = guard.finish();
        assert_eq!(out.releases.len(), 2);
        for release in out.releases {
            release();
        }
        assert!(subs.is_empty());
    }

    #[test]
    fn untracked_blocks_observation() {
        let subs = SubscriberSet::new();
        let guard = enter(SubscriberId::new(), NotifyKind::Run, noop());

        untracked(|| {
            assert!(!is_tracking());
            observe(&subs);
        });

        assert!(subs.is_empty());
        assert!(is_tracking());
        guard.finish();
    }

    #[test]
    fn on_cleanup_skips_untracked_frames() {
        let guard = enter(SubscriberId::new(), NotifyKind::Run, noop());
        untracked(|| {
            on_cleanup(|| {});
        });
        let out = guard.finish();
        assert_eq!(out.cleanups.len(), 1);
    }

    #[test]
    fn on_cleanup_outside_any_run_is_dropped() {
        // Must not panic; the callback is discarded.
        on_cleanup(|| {});
    }
}
