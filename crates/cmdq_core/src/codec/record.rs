//! # Record Layout
//!
//! ```text
//! ┌──────────────────┬──────────────────┬───────────────────────────┐
//! │ invoker (fn ptr) │ total_size (u32) │ payload (total - header)  │
//! └──────────────────┴──────────────────┴───────────────────────────┘
//! ```
//!
//! `total_size` counts the header too, so it is also the distance to the
//! next record. Nothing is aligned: every field is written and read with
//! unaligned accesses, so records pack back to back with no padding.
//!
//! The layout is only meaningful inside one process run.

#![allow(unsafe_code)]

use std::mem;
use std::ptr;

use crate::error::{QueueError, QueueResult};

/// Entry point stored in a record header.
///
/// Called by the consumer with the record's payload bytes. Typed commands
/// store a generated decode stub here; raw commands store the caller's
/// handler directly.
pub type Invoker = unsafe fn(&[u8]);

/// Size of the invoker field.
pub const INVOKER_SIZE: usize = mem::size_of::<Invoker>();

/// Size of the `total_size` field.
pub const SIZE_FIELD: usize = mem::size_of::<u32>();

/// Size of a record header.
pub const HEADER_SIZE: usize = INVOKER_SIZE + SIZE_FIELD;

/// Total record size for a payload of `payload_len` bytes.
///
/// # Errors
///
/// Returns [`QueueError::RecordTooLarge`] if the record does not fit `u32`.
pub fn record_size(payload_len: usize) -> QueueResult<u32> {
    let total = HEADER_SIZE
        .checked_add(payload_len)
        .ok_or(QueueError::RecordTooLarge { size: usize::MAX })?;
    u32::try_from(total).map_err(|_| QueueError::RecordTooLarge { size: total })
}

/// Writes a record header at the start of `record`.
///
/// # Panics
///
/// Panics if `record` is shorter than [`HEADER_SIZE`].
pub(crate) fn write_header(record: &mut [u8], invoker: Invoker, total_size: u32) {
    assert!(record.len() >= HEADER_SIZE, "record shorter than its header");
    // SAFETY: bounds checked above; write_unaligned has no alignment requirement.
    unsafe { ptr::write_unaligned(record.as_mut_ptr().cast::<Invoker>(), invoker) };
    record[INVOKER_SIZE..HEADER_SIZE].copy_from_slice(&total_size.to_ne_bytes());
}

/// Reads the header at the start of `record`.
///
/// # Safety
///
/// `record` must start with a header written by [`write_header`].
pub(crate) unsafe fn read_header(record: &[u8]) -> (Invoker, u32) {
    debug_assert!(record.len() >= HEADER_SIZE);
    // SAFETY: the caller guarantees a valid invoker was written here.
    let invoker = unsafe { ptr::read_unaligned(record.as_ptr().cast::<Invoker>()) };
    let mut size = [0u8; SIZE_FIELD];
    size.copy_from_slice(&record[INVOKER_SIZE..HEADER_SIZE]);
    (invoker, u32::from_ne_bytes(size))
}

/// Sequential writer moving typed values into a payload region.
pub(crate) struct PayloadWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> PayloadWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Moves `value` into the next `size_of::<T>()` bytes.
    ///
    /// Ownership passes to the payload: the value is not dropped here and
    /// must later be moved out with [`PayloadReader::take`].
    pub(crate) fn put<T>(&mut self, value: T) {
        let end = self.offset + mem::size_of::<T>();
        assert!(end <= self.buf.len(), "payload region too small");
        // SAFETY: bounds checked above; write_unaligned has no alignment requirement.
        unsafe { ptr::write_unaligned(self.buf.as_mut_ptr().add(self.offset).cast::<T>(), value) };
        self.offset = end;
    }
}

/// Sequential reader moving typed values back out of a payload.
pub(crate) struct PayloadReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Moves the next `T` out of the payload.
    ///
    /// # Safety
    ///
    /// The next `size_of::<T>()` bytes must hold a `T` written by
    /// [`PayloadWriter::put`] at the same offset, and must not have been
    /// taken before.
    pub(crate) unsafe fn take<T>(&mut self) -> T {
        debug_assert!(self.offset + mem::size_of::<T>() <= self.buf.len());
        // SAFETY: the caller guarantees a live `T` sits at this offset.
        let value = unsafe { ptr::read_unaligned(self.buf.as_ptr().add(self.offset).cast::<T>()) };
        self.offset += mem::size_of::<T>();
        value
    }
}
