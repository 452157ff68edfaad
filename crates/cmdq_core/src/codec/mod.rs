//! # Command Record Codec
//!
//! Every command is one variable-length record in an arena:
//!
//! ```text
//! [invoker][total_size: u32][payload ...][invoker][total_size][payload ...] ...
//! ```
//!
//! Three encodings share this layout:
//!
//! | Command   | Invoker                        | Payload                      |
//! |-----------|--------------------------------|------------------------------|
//! | `execute` | generated stub for (F, Args)   | `F`, `Args`                  |
//! | `returns` | generated stub for (F, Args)   | `F`, result slot, `Args`     |
//! | raw       | caller's [`RawHandler`]        | raw bytes, verbatim          |
//!
//! Draining a record is one indirect call through its invoker.

pub mod call;
pub mod raw;
pub mod record;

pub use call::{Callable, ReturnSlot};
pub use raw::{RawArgs, RawHandler, RawReader};
pub use record::{Invoker, HEADER_SIZE};
