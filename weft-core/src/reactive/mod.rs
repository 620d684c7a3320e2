//! Reactive Primitives
//!
//! This module implements the fine-grained reactive runtime: cells, derived
//! cells, effects, and batch scopes.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. When a cell's value is read
//! within a tracking context (a derived cell or effect run), the cell
//! automatically registers that computation as a subscriber. A changed write
//! notifies all subscribers; writes of a same-value-equal value are skipped.
//!
//! ## Derived cells
//!
//! A [`Derived`] is a cached value computed from other reactive values. It
//! is lazy: a dependency change only marks it dirty and cascades the mark;
//! the derivation re-runs on the next read. Its dependency set is rebuilt on
//! every run.
//!
//! ## Effects
//!
//! An [`Effect`] is an eager side-effecting subscriber: it runs at creation
//! and re-runs on every dependency change, with per-run cleanup via
//! [`on_cleanup`] or a returned cleanup closure.
//!
//! ## Batching
//!
//! [`batch`] coalesces notifications from any number of writes into a single
//! deduplicated flush at the outermost batch exit.
//!
//! # Implementation Notes
//!
//! Dependency detection uses a thread-local context stack: while a derived
//! cell or effect is executing, every cell it reads registers it as a
//! subscriber. This "automatic dependency tracking" approach is the one used
//! by SolidJS, Vue 3, and Leptos.
//!
//! Propagation is two-phase. A write first runs derived-cell invalidations
//! synchronously, marking the whole downstream graph dirty; only then are
//! effect re-runs delivered, through a deduplicating pending queue. Combined
//! with lazy derived evaluation this keeps reads glitch-free: an effect
//! re-reading a diamond-shaped graph always sees values computed from the
//! same source state.

mod batch;
mod cell;
mod context;
mod derived;
mod effect;
mod subscriber;
mod value;

pub use batch::{batch, batch_depth};
pub use cell::Cell;
pub use context::{context_depth, is_tracking, on_cleanup, untracked};
pub use derived::Derived;
pub use effect::{on_mount, Effect};
pub use subscriber::{SubscriberId, Subscription};
pub use value::SameValue;

/// Create a new reactive cell. Free-function spelling of [`Cell::new`],
/// matching the calling convention the view compiler emits.
pub fn create_cell<T>(initial: T) -> Cell<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    Cell::new(initial)
}

/// Create a new derived cell. Free-function spelling of [`Derived::new`].
pub fn create_derived<T, F>(compute: F) -> Derived<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Derived::new(compute)
}

/// Create a new effect. Free-function spelling of [`Effect::new`].
pub fn create_effect<F>(body: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(body)
}
