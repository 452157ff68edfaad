//! # Memory Module
//!
//! The growable arena that command records are appended into.

mod arena;

pub(crate) use arena::Arena;
