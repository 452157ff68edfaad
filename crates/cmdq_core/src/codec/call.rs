//! # Typed Call Records
//!
//! `execute` and `returns` commands store a callable and its argument tuple
//! by value. The decode stub in the record header is generated from the
//! same type parameters used to encode, so a payload can never be decoded
//! as anything other than what was written.
//!
//! ```text
//! execute:  [F][Args]
//! returns:  [F][result slot][Args]
//! ```
//!
//! Arguments are captured by value and must be `Send + 'static`. A raw
//! pointer smuggled inside an argument is never followed by the queue; what
//! it points to must stay alive until the command has run.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::hint;
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::record::{PayloadReader, PayloadWriter};

/// A function that can be deferred with the argument tuple `Args`.
///
/// Implemented for every `FnOnce` taking zero to six arguments, with the
/// arguments packed in a tuple: a two-argument function is
/// `Callable<(A, B)>`, a one-argument function `Callable<(A,)>`.
pub trait Callable<Args>: Send + 'static {
    /// Value produced by the call.
    type Output;

    /// Unpacks `args` and calls the function.
    fn invoke(self, args: Args) -> Self::Output;
}

macro_rules! impl_callable {
    ($($arg:ident : $ty:ident),*) => {
        impl<Func, Ret, $($ty,)*> Callable<($($ty,)*)> for Func
        where
            Func: FnOnce($($ty),*) -> Ret + Send + 'static,
        {
            type Output = Ret;

            #[inline]
            fn invoke(self, ($($arg,)*): ($($ty,)*)) -> Ret {
                self($($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(a1: A1);
impl_callable!(a1: A1, a2: A2);
impl_callable!(a1: A1, a2: A2, a3: A3);
impl_callable!(a1: A1, a2: A2, a3: A3, a4: A4);
impl_callable!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
impl_callable!(a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);

/// Payload size of an `execute` record.
pub(crate) const fn execute_payload_size<F, Args>() -> usize {
    mem::size_of::<F>() + mem::size_of::<Args>()
}

/// Encodes an `execute` payload.
pub(crate) fn encode_execute<F, Args>(payload: &mut [u8], func: F, args: Args) {
    let mut writer = PayloadWriter::new(payload);
    writer.put(func);
    writer.put(args);
}

/// Decode stub for `execute` records.
///
/// # Safety
///
/// `payload` must have been written by [`encode_execute`] with the same `F`
/// and `Args`, and must not be decoded twice.
pub(crate) unsafe fn execute_stub<F, Args>(payload: &[u8])
where
    F: Callable<Args>,
{
    let mut reader = PayloadReader::new(payload);
    // SAFETY: the caller guarantees the layout written by encode_execute.
    let (func, args) = unsafe { (reader.take::<F>(), reader.take::<Args>()) };
    func.invoke(args);
}

/// Payload size of a `returns` record.
pub(crate) const fn returns_payload_size<F, R, Args>() -> usize {
    mem::size_of::<F>() + mem::size_of::<Arc<SlotCell<R>>>() + mem::size_of::<Args>()
}

/// Encodes a `returns` payload.
pub(crate) fn encode_returns<F, R, Args>(
    payload: &mut [u8],
    func: F,
    slot: &ReturnSlot<R>,
    args: Args,
) {
    let mut writer = PayloadWriter::new(payload);
    writer.put(func);
    writer.put(Arc::clone(&slot.cell));
    writer.put(args);
}

/// Decode stub for `returns` records: calls and stores the result.
///
/// # Safety
///
/// `payload` must have been written by [`encode_returns`] with the same
/// `F` and `Args`, and must not be decoded twice.
pub(crate) unsafe fn returns_stub<F, Args>(payload: &[u8])
where
    F: Callable<Args>,
    F::Output: Send,
{
    let mut reader = PayloadReader::new(payload);
    // SAFETY: the caller guarantees the layout written by encode_returns.
    let (func, slot, args) = unsafe {
        (
            reader.take::<F>(),
            reader.take::<Arc<SlotCell<F::Output>>>(),
            reader.take::<Args>(),
        )
    };
    slot.fill(func.invoke(args));
}

const EMPTY: u8 = 0;
const BUSY: u8 = 1;
const FILLED: u8 = 2;

/// Shared cell behind a [`ReturnSlot`].
///
/// Holds at most one result. Whoever moves the state to `BUSY` has sole
/// access to the value until it stores the next state.
pub(crate) struct SlotCell<R> {
    value: UnsafeCell<Option<R>>,
    state: AtomicU8,
}

// SAFETY: the value is only touched between a successful CAS into BUSY and
// the Release store that leaves it; the Acquire CAS pairs with that store.
unsafe impl<R: Send> Sync for SlotCell<R> {}

impl<R> SlotCell<R> {
    fn fill(&self, result: R) {
        loop {
            match self
                .state
                .compare_exchange(EMPTY, BUSY, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(FILLED) => {
                    tracing::warn!("result slot still holds an untaken result; dropping new result");
                    return;
                }
                // The owner is mid-take.
                Err(_) => hint::spin_loop(),
            }
        }
        // SAFETY: the EMPTY -> BUSY transition gives this thread sole access.
        unsafe { *self.value.get() = Some(result) };
        self.state.store(FILLED, Ordering::Release);
    }

    fn take(&self) -> Option<R> {
        if self
            .state
            .compare_exchange(FILLED, BUSY, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        // SAFETY: the FILLED -> BUSY transition gives this thread sole access,
        // and Acquire pairs with the writer's Release store.
        let result = unsafe { (*self.value.get()).take() };
        self.state.store(EMPTY, Ordering::Release);
        result
    }
}

/// Destination for the result of a [`returns`](crate::CommandQueue::returns) command.
///
/// ## Precondition
///
/// The result is written on the consumer thread at some point after the
/// command is enqueued. The caller must [`join`](crate::CommandQueue::join)
/// the queue (or otherwise know the command has run) before reading it.
/// Reading earlier is not undefined behaviour, it simply yields `None`.
///
/// A slot holds one result at a time and can be reused once it has been
/// taken. If a second result arrives before the first was taken it is
/// dropped with a warning. If the command panics the slot stays empty.
///
/// ```rust,ignore
/// fn add2(a: i32, b: i32) -> i32 { a + b }
///
/// let mut sum = ReturnSlot::new();
/// queue.returns(add2, &sum, (2, 3))?;
/// queue.join()?;
/// assert_eq!(sum.take(), Some(5));
/// ```
pub struct ReturnSlot<R> {
    cell: Arc<SlotCell<R>>,
}

impl<R> ReturnSlot<R> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: Arc::new(SlotCell {
                value: UnsafeCell::new(None),
                state: AtomicU8::new(EMPTY),
            }),
        }
    }

    /// Returns true if a result has been written and not yet taken.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.state.load(Ordering::Acquire) == FILLED
    }

    /// Moves the result out, if one has been written.
    pub fn take(&mut self) -> Option<R> {
        self.cell.take()
    }

    /// Consumes the slot, returning the result if one has been written.
    #[must_use]
    pub fn into_inner(self) -> Option<R> {
        self.cell.take()
    }
}

impl<R> Default for ReturnSlot<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for ReturnSlot<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnSlot")
            .field("ready", &self.is_ready())
            .finish()
    }
}
