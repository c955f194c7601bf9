//! Block handles over pool slots.

use core::fmt;
use core::mem::size_of;
use core::ptr;
use core::slice;

/// Crate-internal view of a pool from the perspective of a block
/// handle: enough to locate the slot's bytes and to give the slot back.
pub(crate) trait PoolBackend: Sync {
    /// Block size of `class`.
    fn block_size(&self, class: u8) -> usize;
    /// Base pointer of `(class, slot)` inside the arena.
    fn slot_ptr(&self, class: u8, slot: u16) -> *mut u8;
    /// Mark `(class, slot)` available again.
    fn release(&self, class: u8, slot: u16);
}

/// Exclusive, move-only handle to one pool slot.
///
/// At most one live `Block` references a slot at any time; dropping the
/// handle returns the slot to its pool (the release runs in a critical
/// section, so blocks may be dropped from completion callbacks in
/// interrupt context).
///
/// The handle identifies its slot by `(class, slot)` index, so the
/// release is O(1), and byte access is bounds-checked instead of going
/// through raw pointer reinterpretation.
pub struct Block<'p> {
    pool: &'p dyn PoolBackend,
    class: u8,
    slot: u16,
}

impl<'p> Block<'p> {
    pub(crate) fn new(pool: &'p dyn PoolBackend, class: u8, slot: u16) -> Self {
        Self { pool, class, slot }
    }

    /// Capacity in bytes: the block size of the slot's class, which may
    /// exceed the requested allocation size.
    pub fn len(&self) -> usize {
        self.pool.block_size(self.class)
    }

    /// Always `false`; a block never has zero capacity.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Base address of the slot, for DMA address programming.
    ///
    /// The pointer stays valid for the lifetime of the handle. Slot
    /// starts are aligned to [`crate::pool::SLOT_ALIGN`].
    pub fn as_ptr(&self) -> *mut u8 {
        self.pool.slot_ptr(self.class, self.slot)
    }

    /// The block's bytes.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the handle exclusively owns the slot; the returned
        // borrow keeps `self` shared for its duration.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// The block's bytes, mutably.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`, plus the `&mut self` receiver makes
        // the borrow exclusive.
        unsafe { slice::from_raw_parts_mut(self.as_ptr(), self.len()) }
    }

    /// Read a plain value at a byte offset (unaligned access).
    ///
    /// # Panics
    ///
    /// If `offset + size_of::<T>()` exceeds the block length.
    pub fn read_at<T: Copy>(&self, offset: usize) -> T {
        assert!(
            offset + size_of::<T>() <= self.len(),
            "typed read out of bounds"
        );
        // SAFETY: bounds checked above; read_unaligned has no alignment
        // requirement; T: Copy guarantees a plain bit pattern.
        unsafe { ptr::read_unaligned(self.as_ptr().add(offset).cast::<T>()) }
    }

    /// Write a plain value at a byte offset (unaligned access).
    ///
    /// # Panics
    ///
    /// If `offset + size_of::<T>()` exceeds the block length.
    pub fn write_at<T: Copy>(&mut self, offset: usize, value: T) {
        assert!(
            offset + size_of::<T>() <= self.len(),
            "typed write out of bounds"
        );
        // SAFETY: bounds checked above; write_unaligned has no
        // alignment requirement.
        unsafe { ptr::write_unaligned(self.as_ptr().add(offset).cast::<T>(), value) }
    }
}

impl Drop for Block<'_> {
    fn drop(&mut self) {
        self.pool.release(self.class, self.slot);
    }
}

impl fmt::Debug for Block<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("class", &self.class)
            .field("slot", &self.slot)
            .field("len", &self.len())
            .finish()
    }
}
