//! # Command Queue
//!
//! Producer façade over the two arenas and the consumer thread.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn add2(a: i32, b: i32) -> i32 { a + b }
//!
//! let queue = CommandQueue::new()?;
//! queue.execute(|name: &'static str| println!("hello {name}"), ("world",))?;
//!
//! let mut sum = ReturnSlot::new();
//! queue.returns(add2, &sum, (2, 3))?;
//!
//! queue.join()?;
//! assert_eq!(sum.take(), Some(5));
//! ```
//!
//! ## Ordering
//!
//! - Records drained from one arena run in append order.
//! - Sequential enqueues from one thread run in that sequence.
//! - Interleaving between producers is unspecified.

#![allow(unsafe_code)]

mod checkpoint;
mod consumer;
mod stats;

pub use checkpoint::Checkpoint;
pub use stats::QueueStats;

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::codec::call::{self, Callable, ReturnSlot};
use crate::codec::raw::{RawArgs, RawHandler};
use crate::codec::record::Invoker;
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::sync::{CompletionSignal, IdleSignal, SlotExchange};
use stats::Counters;

/// State shared between the façade and the consumer thread.
pub(crate) struct Shared {
    slots: SlotExchange,
    idle: IdleSignal,
    counters: Counters,
}

impl Shared {
    fn stats(&self) -> QueueStats {
        self.counters.snapshot(self.slots.growths())
    }
}

/// A double-buffered queue of deferred calls, run in order by one
/// background thread.
///
/// Any number of threads may enqueue through a shared reference. Each
/// enqueue leases the producer arena, appends one record and hands the
/// arena back; the consumer swaps arenas and drains the full one while
/// producers fill the other.
///
/// Arguments are captured by value. Closures and arguments must be
/// `Send + 'static`; a raw pointer hidden inside an argument is the
/// caller's to keep valid until the command has run.
///
/// Dropping the queue runs every command still queued, then joins the
/// consumer thread.
pub struct CommandQueue {
    shared: Arc<Shared>,
    consumer: Option<JoinHandle<()>>,
    consumer_id: ThreadId,
    config: QueueConfig,
}

impl CommandQueue {
    /// Creates a queue with the default configuration (256-byte arenas).
    ///
    /// # Errors
    ///
    /// Returns an error if the arenas cannot be allocated or the consumer
    /// thread cannot be spawned.
    pub fn new() -> QueueResult<Self> {
        Self::with_config(QueueConfig::default())
    }

    /// Creates a queue whose two arenas start at `initial_capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] for a zero capacity, plus the
    /// errors of [`CommandQueue::new`].
    pub fn with_capacity(initial_capacity: usize) -> QueueResult<Self> {
        Self::with_config(QueueConfig::default().with_initial_capacity(initial_capacity))
    }

    /// Creates a queue from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if the configuration does not
    /// validate, [`QueueError::OutOfMemory`] if the arenas cannot be
    /// allocated, or [`QueueError::SpawnFailed`] if the consumer thread
    /// cannot be started.
    pub fn with_config(config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            slots: SlotExchange::new(config.initial_capacity)?,
            idle: IdleSignal::new(),
            counters: Counters::default(),
        });

        let worker = Arc::clone(&shared);
        let consumer = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || consumer::run(&worker))
            .map_err(|e| QueueError::SpawnFailed(e.to_string()))?;
        let consumer_id = consumer.thread().id();

        tracing::debug!(
            initial_capacity = config.initial_capacity,
            thread = %config.thread_name,
            "command queue started"
        );

        Ok(Self {
            shared,
            consumer: Some(consumer),
            consumer_id,
            config,
        })
    }

    /// Returns the configuration this queue was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Appends one record and wakes the consumer.
    ///
    /// # Safety
    ///
    /// `invoker` must be safe to call, exactly once, on the bytes `write`
    /// leaves in the payload region.
    unsafe fn enqueue<W>(&self, invoker: Invoker, payload_len: usize, write: W) -> QueueResult<()>
    where
        W: FnOnce(&mut [u8]),
    {
        let appended = {
            let mut lease = self.shared.slots.acquire_for_producer();
            // SAFETY: forwarded from the caller.
            unsafe { lease.append(invoker, payload_len, write) }
        };
        appended?;
        self.shared.idle.notify_work();
        Ok(())
    }

    /// Enqueues `func(args...)`.
    ///
    /// `args` is a tuple of zero to six values, moved into the queue:
    ///
    /// ```rust,ignore
    /// queue.execute(print_banner, ())?;
    /// queue.execute(|s: String| log(s), (name,))?;
    /// queue.execute(draw, (x, y, color))?;
    /// ```
    ///
    /// # Errors
    ///
    /// [`QueueError::OutOfMemory`] if the arena cannot grow, or
    /// [`QueueError::RecordTooLarge`] for records over 4 GiB. Nothing is
    /// enqueued in either case.
    pub fn execute<F, Args>(&self, func: F, args: Args) -> QueueResult<()>
    where
        F: Callable<Args>,
        Args: Send + 'static,
    {
        let payload_len = call::execute_payload_size::<F, Args>();
        // SAFETY: the stub decodes exactly what encode_execute writes for the
        // same F and Args.
        unsafe {
            self.enqueue(call::execute_stub::<F, Args>, payload_len, |payload| {
                call::encode_execute(payload, func, args);
            })
        }
    }

    /// Enqueues `func(args...)` and stores its result in `slot`.
    ///
    /// The slot is filled on the consumer thread. Read it after
    /// [`join`](Self::join); before that it may still be empty.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn returns<F, Args>(
        &self,
        func: F,
        slot: &ReturnSlot<F::Output>,
        args: Args,
    ) -> QueueResult<()>
    where
        F: Callable<Args>,
        F::Output: Send + 'static,
        Args: Send + 'static,
    {
        let payload_len = call::returns_payload_size::<F, F::Output, Args>();
        // SAFETY: the stub decodes exactly what encode_returns writes for the
        // same F and Args.
        unsafe {
            self.enqueue(call::returns_stub::<F, Args>, payload_len, |payload| {
                call::encode_returns(payload, func, slot, args);
            })
        }
    }

    /// Chained form of [`execute`](Self::execute).
    ///
    /// ```rust,ignore
    /// queue.then(step, ('a',))?.then(step, ('b',))?.then(step, ('c',))?;
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute); the chain stops at the first error.
    pub fn then<F, Args>(&self, func: F, args: Args) -> QueueResult<&Self>
    where
        F: Callable<Args>,
        Args: Send + 'static,
    {
        self.execute(func, args)?;
        Ok(self)
    }

    /// Enqueues `handler` with plain-old-data arguments packed back to back.
    ///
    /// The handler receives the packed bytes and decodes them itself,
    /// usually with a [`RawReader`](crate::RawReader).
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn raw_execute<A: RawArgs>(&self, handler: RawHandler, args: A) -> QueueResult<()> {
        let payload_len = args.byte_len();
        // SAFETY: a raw handler is a safe fn, valid for any payload bytes.
        unsafe { self.enqueue(handler, payload_len, |payload| args.write_to(payload)) }
    }

    /// Enqueues `handler` with a copy of `data` as its payload.
    ///
    /// The bytes are copied before this returns; `data` may be reused
    /// immediately.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn execute_with_copy(&self, handler: RawHandler, data: &[u8]) -> QueueResult<()> {
        // SAFETY: a raw handler is a safe fn, valid for any payload bytes.
        unsafe {
            self.enqueue(handler, data.len(), |payload| payload.copy_from_slice(data))
        }
    }

    /// Enqueues a checkpoint without waiting for it.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn checkpoint(&self) -> QueueResult<Checkpoint> {
        let signal = Arc::new(CompletionSignal::new());
        self.execute(checkpoint::reach, (Arc::clone(&signal),))?;
        Ok(Checkpoint::new(signal, self.consumer_id))
    }

    /// Blocks until every command enqueued before this call has run.
    ///
    /// Commands enqueued concurrently by other threads may or may not have
    /// run when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::JoinFromConsumer`] when called from inside a
    /// queued command, plus the errors of [`execute`](Self::execute).
    pub fn join(&self) -> QueueResult<()> {
        if thread::current().id() == self.consumer_id {
            return Err(QueueError::JoinFromConsumer);
        }
        self.checkpoint()?.wait()
    }

    /// Returns a snapshot of the consumer's counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }

    /// Capacity of each arena in bytes, as of its last hand-off.
    #[must_use]
    pub fn arena_capacities(&self) -> [usize; 2] {
        self.shared.slots.capacities()
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("config", &self.config)
            .field("arena_capacities", &self.arena_capacities())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        // The consumer drains both arenas before it honours this.
        self.shared.idle.request_shutdown();

        let Some(consumer) = self.consumer.take() else {
            return;
        };
        if thread::current().id() == self.consumer_id {
            // Dropped by one of its own commands: the consumer finishes the
            // current drain and exits on its own.
            tracing::debug!("command queue dropped on its consumer thread; detaching");
            return;
        }
        if consumer.join().is_err() {
            tracing::error!("command queue consumer thread panicked");
        }
    }
}
