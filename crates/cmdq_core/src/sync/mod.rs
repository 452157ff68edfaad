//! # Synchronization Module
//!
//! Lock-free arena hand-off and the blocking signals around it.

pub(crate) mod signal;
pub(crate) mod slot_exchange;

pub(crate) use signal::{CompletionSignal, IdleSignal};
pub(crate) use slot_exchange::SlotExchange;
