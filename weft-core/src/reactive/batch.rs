//! Write batching and the pending notification queue.
//!
//! Every runnable notification (effects, manual subscriptions) goes through
//! a thread-local pending queue keyed by subscriber ID: an `IndexMap`, so
//! duplicates coalesce and delivery order is first-enqueue order.
//!
//! [`batch`] opens a deferral window: while the depth is non-zero, the queue
//! only accumulates. Batches nest; only the outermost exit flushes. Outside
//! any batch, a cell write flushes as its last step, after the synchronous
//! invalidation cascade has marked every downstream derived cell dirty, which
//! is what prevents an effect from observing one updated input and one stale
//! one.
//!
//! The flush drains in rounds: callbacks enqueued *during* a flush (an
//! effect writing another cell, a freshly dirtied derived scheduling its
//! subscribers) are picked up by the next round rather than invoked
//! reentrantly. A new flush is never started while one is in progress.

use std::cell::RefCell;

use indexmap::IndexMap;
use tracing::trace;

use super::subscriber::{NotifyFn, SubscriberId};

struct BatchState {
    depth: usize,
    flushing: bool,
    pending: IndexMap<SubscriberId, NotifyFn>,
}

thread_local! {
    static STATE: RefCell<BatchState> = RefCell::new(BatchState {
        depth: 0,
        flushing: false,
        pending: IndexMap::new(),
    });
}

/// Run `f` with notification delivery deferred until the outermost batch
/// exits. Derived-cell invalidation still happens during the writes (it is
/// cheap and idempotent); only re-executions are coalesced.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    struct DepthGuard;
    impl Drop for DepthGuard {
        fn drop(&mut self) {
            STATE.with(|state| state.borrow_mut().depth -= 1);
        }
    }

    STATE.with(|state| state.borrow_mut().depth += 1);
    let out = {
        let _guard = DepthGuard;
        f()
    };
    flush_if_idle();
    out
}

/// Current batch nesting depth.
pub fn batch_depth() -> usize {
    STATE.with(|state| state.borrow().depth)
}

/// Queue one runnable notification, coalescing by subscriber ID. The first
/// delivery for an ID wins its place in the flush order.
pub(crate) fn deliver(id: SubscriberId, notify: NotifyFn) {
    STATE.with(|state| {
        state.borrow_mut().pending.entry(id).or_insert(notify);
    });
}

/// Drain the pending queue unless a batch is open or a flush is already
/// running further up the stack.
pub(crate) fn flush_if_idle() {
    struct FlushGuard;
    impl Drop for FlushGuard {
        fn drop(&mut self) {
            STATE.with(|state| state.borrow_mut().flushing = false);
        }
    }

    let proceed = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth > 0 || state.flushing || state.pending.is_empty() {
            false
        } else {
            state.flushing = true;
            true
        }
    });
    if !proceed {
        return;
    }

    let _guard = FlushGuard;
    loop {
        let round: Vec<NotifyFn> = STATE.with(|state| {
            let mut state = state.borrow_mut();
            std::mem::take(&mut state.pending)
                .into_iter()
                .map(|(_, f)| f)
                .collect()
        });
        if round.is_empty() {
            break;
        }
        trace!(subscribers = round.len(), "flushing notification round");
        for notify in round {
            notify();
        }
    }
}
