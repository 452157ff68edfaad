//! # CMDQ Core
//!
//! Double-buffered command queue: any number of producer threads enqueue
//! deferred calls, one background thread runs them in append order.
//!
//! ## Architecture
//!
//! ```text
//!   producer ─┐                                   ┌──────────────────┐
//!   producer ─┼─► execute / returns / raw ──────► │ producer arena   │
//!   producer ─┘   (lease, append, release)        └────────┬─────────┘
//!                                                          │ swap
//!                                                 ┌────────▼─────────┐
//!                  consumer thread ◄── drain ──── │ consumer arena   │
//!                  (run, reset, swap again)       └──────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **No lock on enqueue** - producers exchange arenas through two atomic
//!    slots; the consumer only blocks when it finds both arenas empty
//! 2. **No allocation per command** - records are bump-allocated into arenas
//!    that grow by doubling and never shrink
//! 3. **Typed dispatch** - every record carries a decode stub generated for
//!    its exact callable and argument types
//! 4. **Isolated failures** - a panicking command is counted and logged; the
//!    consumer keeps draining
//!
//! ## Example
//!
//! ```rust,ignore
//! use cmdq_core::{CommandQueue, ReturnSlot};
//!
//! fn add2(a: i32, b: i32) -> i32 { a + b }
//!
//! let queue = CommandQueue::new()?;
//! queue.then(|| print!("a"), ())?.then(|| print!("b"), ())?;
//!
//! let mut sum = ReturnSlot::new();
//! queue.returns(add2, &sum, (2, 3))?;
//! queue.join()?;
//! assert_eq!(sum.take(), Some(5));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod codec;
pub mod config;
pub mod error;
mod memory;
pub mod queue;
mod sync;

pub use codec::{Callable, RawArgs, RawHandler, RawReader, ReturnSlot, HEADER_SIZE};
pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use queue::{Checkpoint, CommandQueue, QueueStats};
