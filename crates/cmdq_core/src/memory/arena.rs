//! # Command Arena
//!
//! A growable bump buffer of command records that is drained and reset all
//! at once.

#![allow(unsafe_code)]

use crate::codec::record::{self, Invoker, HEADER_SIZE};
use crate::error::{QueueError, QueueResult};

/// A bump-pointer arena of command records.
///
/// Appends are fast (write a header, bump a cursor). Records are never
/// removed one by one: the consumer runs them all, then [`Arena::reset`]
/// rewinds the cursor.
///
/// # Growth
///
/// When an append does not fit, capacity doubles until it does and the
/// storage is reallocated once. Capacity NEVER shrinks: an arena that once
/// needed 1 MB will likely need it again.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. The slot exchange hands each arena to
/// exactly one thread at a time.
pub(crate) struct Arena {
    /// Backing storage; its length is the capacity.
    storage: Vec<u8>,
    /// Bytes occupied by complete records.
    used: usize,
    /// Which of the queue's two arenas this is.
    id: usize,
}

impl Arena {
    /// Creates an arena with the specified capacity in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfMemory`] if the storage cannot be reserved.
    pub(crate) fn new(id: usize, capacity: usize) -> QueueResult<Self> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| QueueError::OutOfMemory { requested: capacity })?;
        storage.resize(capacity, 0);
        Ok(Self {
            storage,
            used: 0,
            id,
        })
    }

    /// Returns which of the two arenas this is (0 or 1).
    #[inline]
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Returns the total capacity in bytes.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the bytes occupied by records.
    #[inline]
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// Returns true if the arena holds no records.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Appends one record.
    ///
    /// `write_payload` receives exactly `payload_len` bytes. The header is
    /// written and the cursor advanced only after it returns, so a payload
    /// writer that panics leaves the arena as it was.
    ///
    /// # Errors
    ///
    /// [`QueueError::RecordTooLarge`] if the record does not fit a `u32`,
    /// [`QueueError::OutOfMemory`] if growth fails. The arena is unchanged
    /// in both cases.
    ///
    /// # Safety
    ///
    /// `invoker` must be safe to call with the bytes `write_payload` leaves
    /// in the payload region, exactly once.
    pub(crate) unsafe fn append<W>(
        &mut self,
        invoker: Invoker,
        payload_len: usize,
        write_payload: W,
    ) -> QueueResult<()>
    where
        W: FnOnce(&mut [u8]),
    {
        let total = record::record_size(payload_len)?;
        let start = self.used;
        let end = start
            .checked_add(total as usize)
            .ok_or(QueueError::OutOfMemory { requested: usize::MAX })?;
        if end > self.capacity() {
            self.grow(end)?;
        }

        let record = &mut self.storage[start..end];
        write_payload(&mut record[HEADER_SIZE..]);
        record::write_header(record, invoker, total);
        self.used = end;
        Ok(())
    }

    /// Doubles capacity until `required` bytes fit.
    fn grow(&mut self, required: usize) -> QueueResult<()> {
        let old_capacity = self.capacity();
        let mut capacity = old_capacity.max(1);
        while capacity < required {
            capacity = capacity
                .checked_mul(2)
                .ok_or(QueueError::OutOfMemory { requested: required })?;
        }

        self.storage
            .try_reserve_exact(capacity - old_capacity)
            .map_err(|_| QueueError::OutOfMemory { requested: capacity })?;
        self.storage.resize(capacity, 0);

        tracing::trace!(arena = self.id, old_capacity, capacity, "arena grown");
        Ok(())
    }

    /// Iterates the records in append order.
    pub(crate) fn records(&self) -> Records<'_> {
        Records {
            bytes: &self.storage[..self.used],
        }
    }

    /// Resets the arena, discarding all records.
    ///
    /// This is a **zero-cost** operation - no memory is freed or reallocated.
    /// Every record must have been run (or deliberately leaked) first.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.used = 0;
    }
}

/// Iterator over the `(invoker, payload)` pairs of an arena.
pub(crate) struct Records<'a> {
    bytes: &'a [u8],
}

impl<'a> Iterator for Records<'a> {
    type Item = (Invoker, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        // SAFETY: only `Arena::append` writes below `used`, and it writes a
        // complete header at the start of every record.
        let (invoker, total) = unsafe { record::read_header(self.bytes) };
        let (record, rest) = self.bytes.split_at(total as usize);
        self.bytes = rest;
        Some((invoker, &record[HEADER_SIZE..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};

    fn noop(_payload: &[u8]) {}

    fn append_bytes(arena: &mut Arena, payload: &[u8]) -> QueueResult<()> {
        unsafe { arena.append(noop, payload.len(), |out| out.copy_from_slice(payload)) }
    }

    #[test]
    fn test_arena_append() {
        let mut arena = Arena::new(0, 256).unwrap();
        append_bytes(&mut arena, &[1, 2, 3]).unwrap();
        assert_eq!(arena.used(), HEADER_SIZE + 3);
        assert_eq!(arena.capacity(), 256);
        assert!(!arena.is_empty());
    }

    #[test]
    fn test_arena_records_in_order() {
        let mut arena = Arena::new(0, 256).unwrap();
        append_bytes(&mut arena, &[1]).unwrap();
        append_bytes(&mut arena, &[]).unwrap();
        append_bytes(&mut arena, &[2, 3, 4, 5]).unwrap();

        let payloads: Vec<&[u8]> = arena.records().map(|(_, payload)| payload).collect();
        assert_eq!(payloads, vec![&[1u8][..], &[][..], &[2, 3, 4, 5][..]]);
    }

    #[test]
    fn test_arena_growth_doubles() {
        let mut arena = Arena::new(0, 256).unwrap();
        let blob = vec![0xAB; 10_000];
        append_bytes(&mut arena, &blob).unwrap();

        let required = HEADER_SIZE + 10_000;
        assert_eq!(arena.capacity(), required.next_power_of_two());
        assert!(arena.capacity() >= required);

        let (_, payload) = arena.records().next().unwrap();
        assert_eq!(payload, &blob[..]);
    }

    #[test]
    fn test_arena_growth_preserves_records() {
        let mut arena = Arena::new(1, 32).unwrap();
        for i in 0..50u8 {
            append_bytes(&mut arena, &[i; 5]).unwrap();
        }
        let firsts: Vec<u8> = arena.records().map(|(_, payload)| payload[0]).collect();
        assert_eq!(firsts, (0..50).collect::<Vec<u8>>());
    }

    #[test]
    fn test_arena_reset_keeps_capacity() {
        let mut arena = Arena::new(0, 64).unwrap();
        append_bytes(&mut arena, &[0; 1000]).unwrap();
        let grown = arena.capacity();
        assert!(grown >= 1000);

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert!(arena.is_empty());
        assert_eq!(arena.records().count(), 0);

        append_bytes(&mut arena, &[1]).unwrap();
        assert_eq!(arena.capacity(), grown);
    }

    #[test]
    fn test_arena_from_zero_capacity() {
        let mut arena = Arena::new(0, 0).unwrap();
        append_bytes(&mut arena, &[9; 3]).unwrap();
        assert_eq!(arena.capacity(), (HEADER_SIZE + 3).next_power_of_two());
    }

    #[test]
    fn test_panicking_writer_leaves_arena_unchanged() {
        let mut arena = Arena::new(0, 256).unwrap();
        append_bytes(&mut arena, &[1, 2]).unwrap();
        let used = arena.used();

        let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            arena.append(noop, 4, |_| panic!("writer failed"))
        }));
        assert!(result.is_err());
        assert_eq!(arena.used(), used);
        assert_eq!(arena.records().count(), 1);
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut arena = Arena::new(0, 256).unwrap();
        let result = unsafe { arena.append(noop, u32::MAX as usize, |_| {}) };
        assert!(matches!(result, Err(QueueError::RecordTooLarge { .. })));
        assert!(arena.is_empty());
        assert_eq!(arena.capacity(), 256);
    }
}
