//! Weft Core
//!
//! This crate provides the core of the Weft reactive view layer.
//! It implements:
//!
//! - Reactive primitives (cells, derived cells, effects)
//! - Glitch-free two-phase change propagation with batching
//! - A reactivity compiler that rewrites plain view-function source onto
//!   the runtime primitives
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: Reactive primitives and dependency tracking
//! - `compile`: Lexing, reactivity inference, and source rewriting for
//!   view functions
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::{Cell, Derived, Effect};
//!
//! // Create a cell
//! let count = Cell::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Derived::new(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! Effect::new(move || {
//!     println!("Doubled: {}", doubled.get());
//! });
//!
//! // Update the cell
//! count.set(5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod compile;
pub mod reactive;
