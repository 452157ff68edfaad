//! # Wake-up Signals
//!
//! Blocking primitives for the consumer thread and for callers waiting on
//! the consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Wakes the idle consumer when producers publish work.
///
/// Producers do not take the lock on every enqueue. Each publish bumps an
/// epoch and only locks when the consumer has announced that it is going to
/// sleep. The consumer records the epoch *before* looking for work and
/// sleeps only while it is unchanged, so a publish that races the check is
/// never lost:
///
/// ```text
/// consumer                         producer
/// --------                         --------
/// e = epoch()                      append + release arena
/// exchange arenas (empty)          published += 1        (SeqCst)
/// sleeping = true      (SeqCst)    if sleeping: lock, notify
/// while published == e: wait
/// ```
///
/// Either the consumer sees the new epoch, or the producer sees
/// `sleeping` and notifies under the lock the consumer is waiting on.
pub(crate) struct IdleSignal {
    published: AtomicU64,
    sleeping: AtomicBool,
    shutdown: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl IdleSignal {
    pub(crate) fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            sleeping: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Current publish epoch.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Producer: announces that a record was released.
    #[inline]
    pub(crate) fn notify_work(&self) {
        self.published.fetch_add(1, Ordering::SeqCst);
        if self.sleeping.load(Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condvar.notify_one();
        }
    }

    /// Consumer: blocks until the epoch moves past `epoch` or shutdown is
    /// requested.
    pub(crate) fn wait_for_work(&self, epoch: u64) {
        let mut guard = self.mutex.lock();
        self.sleeping.store(true, Ordering::SeqCst);
        while self.published.load(Ordering::SeqCst) == epoch && !self.is_shutdown() {
            self.condvar.wait(&mut guard);
        }
        self.sleeping.store(false, Ordering::SeqCst);
    }

    /// Asks the consumer to exit once both arenas are drained.
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    #[inline]
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// One-shot completion flag that threads can block on.
pub(crate) struct CompletionSignal {
    done: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    pub(crate) fn signal(&self) {
        self.done.store(true, Ordering::Release);
        // Taking the lock orders this notify after any waiter's last check.
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    pub(crate) fn wait(&self) {
        if self.is_done() {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.is_done() {
            self.condvar.wait(&mut guard);
        }
    }

    /// Waits up to `timeout`. Returns true if the signal fired.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_done() {
            return true;
        }
        let mut guard = self.mutex.lock();
        if !self.is_done() {
            let _ = self
                .condvar
                .wait_while_for(&mut guard, |_| !self.is_done(), timeout);
        }
        self.is_done()
    }

    #[inline]
    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}
