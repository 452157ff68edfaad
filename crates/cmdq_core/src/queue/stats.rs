//! Consumer-side counters and the snapshot handed to callers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a command queue.
///
/// A snapshot: counters keep moving while the consumer runs. Take it after
/// [`join`](crate::CommandQueue::join) for exact numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Commands run to completion or to a panic.
    pub commands_executed: u64,
    /// Commands that panicked. Included in `commands_executed`.
    pub commands_panicked: u64,
    /// Non-empty arenas drained by the consumer.
    pub drains: u64,
    /// Record bytes drained, headers included.
    pub bytes_drained: u64,
    /// Times an arena was reallocated to fit a record.
    pub arena_growths: u64,
}

impl QueueStats {
    /// Average drained bytes per command, or 0 if nothing ran yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_record_size(&self) -> f64 {
        if self.commands_executed == 0 {
            return 0.0;
        }
        self.bytes_drained as f64 / self.commands_executed as f64
    }
}

/// Counters written by the consumer thread only.
#[derive(Default)]
pub(crate) struct Counters {
    executed: AtomicU64,
    panicked: AtomicU64,
    drains: AtomicU64,
    bytes: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self, bytes: usize) {
        self.drains.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, arena_growths: u64) -> QueueStats {
        QueueStats {
            commands_executed: self.executed.load(Ordering::Relaxed),
            commands_panicked: self.panicked.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            bytes_drained: self.bytes.load(Ordering::Relaxed),
            arena_growths,
        }
    }
}
