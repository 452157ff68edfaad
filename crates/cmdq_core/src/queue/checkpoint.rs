//! Join barrier.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::error::{QueueError, QueueResult};
use crate::sync::CompletionSignal;

/// A point in the command stream.
///
/// Reached once every command enqueued before the
/// [`checkpoint`](crate::CommandQueue::checkpoint) call has run.
///
/// ```rust,ignore
/// queue.execute(upload_mesh, (mesh,))?;
/// let uploaded = queue.checkpoint()?;
/// // ... other work ...
/// uploaded.wait()?;
/// ```
#[derive(Clone)]
pub struct Checkpoint {
    signal: Arc<CompletionSignal>,
    consumer: ThreadId,
}

impl Checkpoint {
    pub(crate) fn new(signal: Arc<CompletionSignal>, consumer: ThreadId) -> Self {
        Self { signal, consumer }
    }

    /// Returns true once the checkpoint was reached. Never blocks.
    #[inline]
    #[must_use]
    pub fn is_reached(&self) -> bool {
        self.signal.is_done()
    }

    /// Blocks until the checkpoint is reached.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::JoinFromConsumer`] when called from the
    /// consumer thread, which would wait on itself forever.
    pub fn wait(&self) -> QueueResult<()> {
        self.check_thread()?;
        self.signal.wait();
        Ok(())
    }

    /// Blocks until the checkpoint is reached or `timeout` elapses.
    /// Returns true if it was reached.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::JoinFromConsumer`] when called from the
    /// consumer thread.
    pub fn wait_timeout(&self, timeout: Duration) -> QueueResult<bool> {
        self.check_thread()?;
        Ok(self.signal.wait_timeout(timeout))
    }

    fn check_thread(&self) -> QueueResult<()> {
        if thread::current().id() == self.consumer && !self.is_reached() {
            return Err(QueueError::JoinFromConsumer);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint")
            .field("reached", &self.is_reached())
            .finish()
    }
}

/// Sentinel command: runs after everything enqueued before it.
pub(crate) fn reach(signal: Arc<CompletionSignal>) {
    signal.signal();
}
