//! Fixed-capacity, type-erased callbacks.
//!
//! Completion handlers run in interrupt context and there is no heap, so
//! callbacks are stored inline in a small fixed buffer instead of a
//! boxed function object. The capture size is checked at compile time;
//! a closure that captures too much fails to build rather than
//! allocating.
//!
//! Two shapes are provided:
//!
//! - [`EventFn`]: a reusable `FnMut(u8)` channel-event handler, stored
//!   in the channel registry.
//! - [`TransferFn`]: a one-shot `FnOnce(Block, usize)` transfer
//!   completion, consumed when the transfer finishes.

use core::mem::{ManuallyDrop, MaybeUninit, align_of, size_of};
use core::ptr;

use crate::pool::Block;

/// Inline capture budget of an [`EventFn`], in pointer-sized words.
pub const EVENT_CAPTURE_WORDS: usize = 4;

/// Inline capture budget of a [`TransferFn`], in pointer-sized words.
pub const TRANSFER_CAPTURE_WORDS: usize = 6;

// =============================================================================
// EventFn
// =============================================================================

/// A reusable channel-event handler with bounded inline capture.
///
/// Invoked with the 1-based channel number that raised the event.
pub struct EventFn {
    storage: [MaybeUninit<usize>; EVENT_CAPTURE_WORDS],
    call: unsafe fn(*mut (), u8),
    drop_glue: unsafe fn(*mut ()),
}

impl EventFn {
    /// Wrap a closure. The capture must fit in
    /// [`EVENT_CAPTURE_WORDS`] words and be word-aligned; both are
    /// enforced at compile time.
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(u8) + Send + 'static,
    {
        const {
            assert!(
                size_of::<F>() <= EVENT_CAPTURE_WORDS * size_of::<usize>(),
                "capture too large for EventFn"
            );
            assert!(
                align_of::<F>() <= align_of::<usize>(),
                "capture over-aligned for EventFn"
            );
        }

        let mut storage = [MaybeUninit::<usize>::uninit(); EVENT_CAPTURE_WORDS];
        // SAFETY: the const assertions above guarantee F fits and is
        // sufficiently aligned for the word-aligned storage.
        unsafe { ptr::write(storage.as_mut_ptr().cast::<F>(), f) };

        Self {
            storage,
            call: Self::call_erased::<F>,
            drop_glue: Self::drop_erased::<F>,
        }
    }

    /// Invoke the handler for `channel`.
    #[inline]
    pub fn invoke(&mut self, channel: u8) {
        // SAFETY: `storage` holds the live closure written in `new`.
        unsafe { (self.call)(self.storage.as_mut_ptr().cast(), channel) }
    }

    unsafe fn call_erased<F: FnMut(u8)>(ctx: *mut (), channel: u8) {
        // SAFETY: `ctx` points at the live F inside `storage`.
        unsafe { (*ctx.cast::<F>())(channel) }
    }

    unsafe fn drop_erased<F>(ctx: *mut ()) {
        // SAFETY: called exactly once, from Drop, on the live F.
        unsafe { ptr::drop_in_place(ctx.cast::<F>()) }
    }
}

impl Drop for EventFn {
    fn drop(&mut self) {
        // SAFETY: `storage` still holds the closure; it is dropped here
        // exactly once.
        unsafe { (self.drop_glue)(self.storage.as_mut_ptr().cast()) }
    }
}

// SAFETY: `new` requires Send captures, and the erased value is only
// touched through exclusive access.
unsafe impl Send for EventFn {}

// =============================================================================
// TransferFn
// =============================================================================

/// A one-shot transfer-completion callback with bounded inline capture.
///
/// Receives the block whose transfer finished and the number of bytes
/// actually moved.
pub struct TransferFn<'p> {
    storage: [MaybeUninit<usize>; TRANSFER_CAPTURE_WORDS],
    call: unsafe fn(*mut (), Block<'p>, usize),
    drop_glue: unsafe fn(*mut ()),
}

impl<'p> TransferFn<'p> {
    /// Wrap a closure. The capture must fit in
    /// [`TRANSFER_CAPTURE_WORDS`] words and be word-aligned; both are
    /// enforced at compile time.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Block<'p>, usize) + Send + 'p,
    {
        const {
            assert!(
                size_of::<F>() <= TRANSFER_CAPTURE_WORDS * size_of::<usize>(),
                "capture too large for TransferFn"
            );
            assert!(
                align_of::<F>() <= align_of::<usize>(),
                "capture over-aligned for TransferFn"
            );
        }

        let mut storage = [MaybeUninit::<usize>::uninit(); TRANSFER_CAPTURE_WORDS];
        // SAFETY: the const assertions above guarantee F fits and is
        // sufficiently aligned for the word-aligned storage.
        unsafe { ptr::write(storage.as_mut_ptr().cast::<F>(), f) };

        Self {
            storage,
            call: Self::call_erased::<F>,
            drop_glue: Self::drop_erased::<F>,
        }
    }

    /// Consume the callback, invoking it with the finished block and the
    /// transferred byte count.
    #[inline]
    pub fn invoke(self, block: Block<'p>, transferred: usize) {
        let this = ManuallyDrop::new(self);
        let mut storage = this.storage;
        // SAFETY: `storage` holds the live closure; `call` moves it out,
        // and ManuallyDrop prevents the drop glue from running again.
        unsafe { (this.call)(storage.as_mut_ptr().cast(), block, transferred) }
    }

    unsafe fn call_erased<F: FnOnce(Block<'p>, usize)>(
        ctx: *mut (),
        block: Block<'p>,
        transferred: usize,
    ) {
        // SAFETY: `ctx` points at the live F; reading it moves ownership
        // into this frame.
        let f = unsafe { ptr::read(ctx.cast::<F>()) };
        f(block, transferred);
    }

    unsafe fn drop_erased<F>(ctx: *mut ()) {
        // SAFETY: only reached when the callback was never invoked.
        unsafe { ptr::drop_in_place(ctx.cast::<F>()) }
    }
}

impl Drop for TransferFn<'_> {
    fn drop(&mut self) {
        // SAFETY: Drop only runs for a never-invoked callback (invoke
        // wraps self in ManuallyDrop), so the closure is still live.
        unsafe { (self.drop_glue)(self.storage.as_mut_ptr().cast()) }
    }
}

// SAFETY: `new` requires Send captures, and the erased value is only
// touched through exclusive access.
unsafe impl Send for TransferFn<'_> {}

// =============================================================================
// Unit Tests
// =============================================================================
