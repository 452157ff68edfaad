//! The consumer thread: drains arenas until shutdown.
//!
//! ```text
//!            ┌──────────────┐  arena empty,      ┌──────────────┐
//!   start ──►│   Draining   │──no shutdown──────►│  Idle-Wait   │
//!            │              │◄──work published───│              │
//!            └──────┬───────┘                    └──────────────┘
//!                   │ arena empty, shutdown requested
//!                   ▼
//!            ┌──────────────┐
//!            │   Shutdown   │
//!            └──────────────┘
//! ```

#![allow(unsafe_code)]

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::Shared;
use crate::memory::Arena;
use crate::queue::stats::Counters;
use crate::sync::slot_exchange::ConsumerSlot;

/// What one pass of the consumer loop found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Poll {
    /// Ran a full arena.
    Drained,
    /// Both arenas empty; sleep until the epoch moves past this one.
    Idle(u64),
    /// Both arenas empty and shutdown requested.
    Stopped,
}

/// Consumer thread body.
pub(super) fn run(shared: &Shared) {
    let mut slot = shared.slots.attach_consumer();
    tracing::debug!("command queue consumer started");

    // The startup arena is the consumer's own and is always empty.
    loop {
        match poll(shared, &mut slot) {
            Poll::Drained => {}
            Poll::Idle(epoch) => {
                tracing::trace!("consumer idle");
                shared.idle.wait_for_work(epoch);
                tracing::trace!("consumer woken");
            }
            Poll::Stopped => break,
        }
    }

    drop(slot);
    let stats = shared.stats();
    tracing::debug!(
        commands_executed = stats.commands_executed,
        commands_panicked = stats.commands_panicked,
        drains = stats.drains,
        bytes_drained = stats.bytes_drained,
        "command queue consumer stopped"
    );
}

/// One exchange and, if it brought records, one drain.
fn poll(shared: &Shared, slot: &mut ConsumerSlot<'_>) -> Poll {
    // Both sampled before the swap. A shutdown seen here was requested after
    // the last producer released, so an empty swap below means no records
    // remain in either arena.
    let shutdown = shared.idle.is_shutdown();
    let epoch = shared.idle.epoch();
    slot.exchange();
    settle(shared, slot, shutdown, epoch)
}

/// Drains the arena taken by the last exchange, or decides to sleep or stop
/// from the flags sampled before it.
fn settle(shared: &Shared, slot: &mut ConsumerSlot<'_>, shutdown: bool, epoch: u64) -> Poll {
    let arena = slot.arena();
    if !arena.is_empty() {
        drain(arena, &shared.counters);
        Poll::Drained
    } else if shutdown {
        Poll::Stopped
    } else {
        Poll::Idle(epoch)
    }
}

/// Runs every record in `arena`, in order, then resets it.
fn drain(arena: &mut Arena, counters: &Counters) {
    for (invoker, payload) in arena.records() {
        // SAFETY: every record was appended by the queue with an invoker that
        // matches its payload, and each record is invoked exactly once
        // before the reset below.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { invoker(payload) }));
        counters.record_executed();
        if let Err(cause) = outcome {
            counters.record_panicked();
            tracing::error!(
                arena = arena.id(),
                panic = panic_message(cause.as_ref()),
                "queued command panicked"
            );
        }
    }
    counters.record_drain(arena.used());
    arena.reset();
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
