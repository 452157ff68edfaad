//! # Raw Records
//!
//! Raw commands skip the generated decode stub: the caller's handler goes
//! straight into the record header and receives the payload bytes as they
//! were written. Used for pre-serialized data (packets read off a socket)
//! or when a handler wants to decode its own arguments.
//!
//! Raw arguments must be plain old data. Each value is copied in byte for
//! byte, back to back, with no padding between values.

use std::mem;

use bytemuck::{AnyBitPattern, NoUninit};

/// Handler for raw commands; receives the payload bytes.
pub type RawHandler = fn(&[u8]);

/// Argument tuples accepted by [`raw_execute`](crate::CommandQueue::raw_execute).
///
/// Implemented for `()` and tuples of up to six [`NoUninit`] values.
pub trait RawArgs {
    /// Number of payload bytes [`RawArgs::write_to`] writes.
    fn byte_len(&self) -> usize;

    /// Copies every value into `out`, in order, with no padding.
    fn write_to(&self, out: &mut [u8]);
}

impl RawArgs for () {
    #[inline]
    fn byte_len(&self) -> usize {
        0
    }

    #[inline]
    fn write_to(&self, _out: &mut [u8]) {}
}

fn copy_parts(out: &mut [u8], parts: &[&[u8]]) {
    let mut offset = 0;
    for part in parts {
        let end = offset + part.len();
        out[offset..end].copy_from_slice(part);
        offset = end;
    }
}

macro_rules! impl_raw_args {
    ($($value:ident : $ty:ident),+) => {
        impl<$($ty: NoUninit),+> RawArgs for ($($ty,)+) {
            #[inline]
            fn byte_len(&self) -> usize {
                0 $(+ mem::size_of::<$ty>())+
            }

            fn write_to(&self, out: &mut [u8]) {
                let ($($value,)+) = self;
                copy_parts(out, &[$(bytemuck::bytes_of($value)),+]);
            }
        }
    };
}

impl_raw_args!(v1: T1);
impl_raw_args!(v1: T1, v2: T2);
impl_raw_args!(v1: T1, v2: T2, v3: T3);
impl_raw_args!(v1: T1, v2: T2, v3: T3, v4: T4);
impl_raw_args!(v1: T1, v2: T2, v3: T3, v4: T4, v5: T5);
impl_raw_args!(v1: T1, v2: T2, v3: T3, v4: T4, v5: T5, v6: T6);

/// Cursor for decoding raw arguments inside a [`RawHandler`].
///
/// ```rust,ignore
/// fn on_move(payload: &[u8]) {
///     let mut reader = RawReader::new(payload);
///     let entity: u32 = reader.read().unwrap_or_default();
///     let x: f32 = reader.read().unwrap_or_default();
/// }
///
/// queue.raw_execute(on_move, (7u32, 1.5f32))?;
/// ```
#[derive(Clone, Debug)]
pub struct RawReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> RawReader<'a> {
    /// Creates a reader over a raw payload.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Reads the next value, or `None` if too few bytes remain.
    pub fn read<T: AnyBitPattern>(&mut self) -> Option<T> {
        let end = self.offset.checked_add(mem::size_of::<T>())?;
        let chunk = self.bytes.get(self.offset..end)?;
        self.offset = end;
        Some(bytemuck::pod_read_unaligned(chunk))
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }
}
