//! # Two-Slot Arena Exchange
//!
//! Lock-free hand-off of the queue's two arenas between producers and the
//! single consumer.
//!
//! ## Safety Note
//!
//! Arenas travel as raw pointers produced by `Box::into_raw`. Every atomic
//! swap that returns a non-null pointer transfers ownership of that arena to
//! the caller; storing a pointer gives it away.

#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!        producers                                    consumer
//!   ┌──────────────────┐                       ┌──────────────────┐
//!   │ acquire: spin    │      ┌─────────┐      │ exchange: swap   │
//!   │ swap(primary,    │◄────►│ primary │◄────►│ held <-> primary │
//!   │      null)       │      └─────────┘      │                  │
//!   │                  │      ┌───────────┐    │ if null: spin on │
//!   │ release: CAS     │─────►│ secondary │───►│ swap(secondary,  │
//!   │ null -> arena,   │      └───────────┘    │      null)       │
//!   │ else secondary   │                       └──────────────────┘
//!   └──────────────────┘
//! ```
//!
//! Exactly two arenas exist. At any instant each is in one of four places:
//! `primary`, `secondary`, a producer's [`ProducerLease`], or the consumer's
//! [`ConsumerSlot`]. A producer that releases while `primary` is occupied can
//! only be racing a consumer that holds nothing, so `secondary` is always
//! empty when it is written.

use std::hint;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crate::error::QueueResult;
use crate::memory::Arena;

/// The two arena slots shared by producers and the consumer.
pub(crate) struct SlotExchange {
    /// Arena available to producers, or null while one is leased.
    primary: AtomicPtr<Arena>,
    /// Overflow slot for a producer release that lost the race to the
    /// consumer; only the consumer takes from it.
    secondary: AtomicPtr<Arena>,
    /// Last capacity each arena was released with.
    capacities: [AtomicUsize; 2],
    /// Number of releases that found their arena grown.
    growths: AtomicU64,
}

impl SlotExchange {
    /// Allocates both arenas: arena 0 for producers, arena 1 for the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfMemory`](crate::QueueError::OutOfMemory)
    /// if either arena cannot be allocated.
    pub(crate) fn new(capacity: usize) -> QueueResult<Self> {
        let producer = Box::new(Arena::new(0, capacity)?);
        let consumer = Box::new(Arena::new(1, capacity)?);
        Ok(Self {
            primary: AtomicPtr::new(Box::into_raw(producer)),
            secondary: AtomicPtr::new(Box::into_raw(consumer)),
            capacities: [AtomicUsize::new(capacity), AtomicUsize::new(capacity)],
            growths: AtomicU64::new(0),
        })
    }

    /// Producer: leases the primary arena, spinning while another thread
    /// holds it.
    ///
    /// The lease is held only for the duration of one append.
    pub(crate) fn acquire_for_producer(&self) -> ProducerLease<'_> {
        loop {
            // Ordering: Acquire - pairs with the Release that put the arena
            // here, so earlier appends are visible before we write after them.
            let arena = self.primary.swap(ptr::null_mut(), Ordering::Acquire);
            if let Some(arena) = NonNull::new(arena) {
                return ProducerLease {
                    exchange: self,
                    arena,
                };
            }
            hint::spin_loop();
        }
    }

    fn release_from_producer(&self, arena: NonNull<Arena>) {
        // Ordering: Release - publishes the appended record with the arena.
        if self
            .primary
            .compare_exchange(
                ptr::null_mut(),
                arena.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_err()
        {
            // The consumer parked its arena in primary and is spinning on
            // secondary for this one.
            let previous = self.secondary.swap(arena.as_ptr(), Ordering::Release);
            debug_assert!(previous.is_null(), "secondary slot already occupied");
        }
    }

    /// Consumer: takes the arena the consumer starts out holding.
    ///
    /// Must be called once, by the consumer thread.
    pub(crate) fn attach_consumer(&self) -> ConsumerSlot<'_> {
        ConsumerSlot {
            exchange: self,
            held: self.take_secondary(),
        }
    }

    fn take_secondary(&self) -> NonNull<Arena> {
        loop {
            // Ordering: Acquire - pairs with the producer's Release store.
            let arena = self.secondary.swap(ptr::null_mut(), Ordering::Acquire);
            if let Some(arena) = NonNull::new(arena) {
                return arena;
            }
            hint::spin_loop();
        }
    }

    /// Last observed capacity of each arena, indexed by arena id.
    pub(crate) fn capacities(&self) -> [usize; 2] {
        [
            self.capacities[0].load(Ordering::Relaxed),
            self.capacities[1].load(Ordering::Relaxed),
        ]
    }

    /// Number of times an arena had to grow.
    pub(crate) fn growths(&self) -> u64 {
        self.growths.load(Ordering::Relaxed)
    }

    fn record_capacity(&self, arena: &Arena) {
        let previous = self.capacities[arena.id()].swap(arena.capacity(), Ordering::Relaxed);
        if previous != arena.capacity() {
            self.growths.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for SlotExchange {
    fn drop(&mut self) {
        // Ordering: get_mut() on drop - exclusive access, no ordering needed.
        for slot in [self.primary.get_mut(), self.secondary.get_mut()] {
            let arena = *slot;
            if !arena.is_null() {
                // SAFETY: non-null pointers in the slots come from `Box::into_raw`
                // and are owned by the exchange while they sit there.
                drop(unsafe { Box::from_raw(arena) });
            }
        }
    }
}

/// Exclusive access to the primary arena for one producer.
///
/// Dropping the lease hands the arena back.
pub(crate) struct ProducerLease<'a> {
    exchange: &'a SlotExchange,
    arena: NonNull<Arena>,
}

impl Deref for ProducerLease<'_> {
    type Target = Arena;

    #[inline]
    fn deref(&self) -> &Arena {
        // SAFETY: the swap that created this lease moved ownership here.
        unsafe { self.arena.as_ref() }
    }
}

impl DerefMut for ProducerLease<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Arena {
        // SAFETY: the swap that created this lease moved ownership here.
        unsafe { self.arena.as_mut() }
    }
}

impl Drop for ProducerLease<'_> {
    fn drop(&mut self) {
        self.exchange.record_capacity(&**self);
        self.exchange.release_from_producer(self.arena);
    }
}

/// The consumer's side of the exchange: the arena it is currently holding.
///
/// Dropping the slot parks the held arena so the exchange can free it.
pub(crate) struct ConsumerSlot<'a> {
    exchange: &'a SlotExchange,
    held: NonNull<Arena>,
}

impl ConsumerSlot<'_> {
    /// Gives the held arena to producers and takes theirs.
    ///
    /// Spins if a producer is mid-append; the producer will release into
    /// `secondary` because `primary` is no longer empty.
    pub(crate) fn exchange(&mut self) {
        // Ordering: AcqRel - Acquire to see the producers' records, Release
        // so the next producer sees our reset cursor.
        let taken = self.exchange.primary.swap(self.held.as_ptr(), Ordering::AcqRel);
        self.held = match NonNull::new(taken) {
            Some(arena) => arena,
            None => self.exchange.take_secondary(),
        };
    }

    /// The arena currently held.
    #[inline]
    pub(crate) fn arena(&mut self) -> &mut Arena {
        // SAFETY: `held` is always owned by this slot.
        unsafe { self.held.as_mut() }
    }
}

impl Drop for ConsumerSlot<'_> {
    fn drop(&mut self) {
        let previous = self
            .exchange
            .secondary
            .swap(self.held.as_ptr(), Ordering::Release);
        debug_assert!(previous.is_null(), "secondary slot already occupied");
    }
}
