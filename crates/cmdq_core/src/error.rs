//! # Queue Error Types
//!
//! All errors that can occur while configuring a queue or enqueueing commands.
//!
//! A command that panics on the consumer thread is NOT an error of this kind:
//! the consumer contains the panic, counts it in [`QueueStats`](crate::QueueStats)
//! and keeps draining.

use thiserror::Error;

/// Errors that can occur in the command queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Growing an arena failed to reserve memory.
    ///
    /// The arena is left exactly as it was before the append.
    #[error("out of memory: arena growth to {requested} bytes failed")]
    OutOfMemory {
        /// Capacity the arena tried to grow to.
        requested: usize,
    },

    /// An encoded record does not fit the 32-bit size field of its header.
    #[error("record too large: {size} bytes does not fit a u32 size field")]
    RecordTooLarge {
        /// Total record size, header included.
        size: usize,
    },

    /// `join()` was called from the consumer thread itself.
    #[error("join called from the consumer thread would never return")]
    JoinFromConsumer,

    /// The OS refused to spawn the consumer thread.
    #[error("failed to spawn consumer thread: {0}")]
    SpawnFailed(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
