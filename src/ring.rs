//! Circular byte/element queue over a pool block.
//!
//! [`RingBuffer`] interprets one [`Block`] as an array of `T` and
//! maintains head/tail indices over it. One storage slot is always
//! sacrificed to distinguish full from empty, so a buffer over `C`
//! elements of storage has `capacity() == C - 1`.
//!
//! Besides `push_back`/`pop_front`, the buffer exposes its free and
//! occupied regions as contiguous runs ([`RingBuffer::insert_position`],
//! [`RingBuffer::read_position`]) so a DMA engine can move bytes
//! directly in and out of the storage without copying; `advance_write` /
//! `advance_read` commit the elements the hardware moved.
//!
//! Element types must be plain data (the storage is zero-initialized
//! and elements are moved bitwise), which the `T: Copy` bound enforces
//! in practice; the intended use is `u8`/`u16`/`u32` I/O payloads.

use core::cmp::min;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ops::Index;
use core::ptr;
use core::slice;

use crate::pool::{Block, Pool, SLOT_ALIGN};

/// Circular queue of `T` backed by a pool block.
pub struct RingBuffer<'p, T> {
    head: usize,
    tail: usize,
    storage: Option<Block<'p>>,
    storage_capacity: usize,
    _marker: PhantomData<T>,
}

impl<'p, T: Copy> RingBuffer<'p, T> {
    /// A buffer with no backing storage: capacity 0, empty and full at
    /// the same time. Safe to query and to push into (pushes are
    /// refused); a harmless placeholder until real storage is attached.
    pub const fn unbacked() -> Self {
        Self {
            head: 0,
            tail: 0,
            storage: None,
            storage_capacity: 1,
            _marker: PhantomData,
        }
    }

    /// Build a buffer over `block`, zeroing the storage.
    ///
    /// Storage capacity is `block.len() / size_of::<T>()`; the usable
    /// capacity is one less.
    ///
    /// # Panics
    ///
    /// If the block holds fewer than two elements of `T`, or if `T`
    /// needs stronger alignment than pool slots guarantee.
    pub fn new(mut block: Block<'p>) -> Self {
        assert!(
            align_of::<T>() <= SLOT_ALIGN,
            "element alignment exceeds pool slot alignment"
        );
        let storage_capacity = block.len() / size_of::<T>();
        assert!(storage_capacity >= 2, "block too small for a ring buffer");
        block.bytes_mut().fill(0);
        Self {
            head: 0,
            tail: 0,
            storage: Some(block),
            storage_capacity,
            _marker: PhantomData,
        }
    }

    /// Allocate storage for `count` elements from `pool` and build a
    /// buffer over it; `None` if the pool cannot serve the request.
    pub fn with_capacity<const BYTES: usize, const SLOTS: usize>(
        pool: &'p Pool<BYTES, SLOTS>,
        count: usize,
    ) -> Option<Self> {
        pool.allocate(count * size_of::<T>()).map(Self::new)
    }

    /// Usable capacity: one less than the element count of the storage.
    pub fn capacity(&self) -> usize {
        self.storage_capacity - 1
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        if self.head <= self.tail {
            self.tail - self.head
        } else {
            self.tail - self.head + self.storage_capacity
        }
    }

    /// Free capacity.
    pub fn available(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Whether no element is queued.
    pub fn is_empty(&self) -> bool {
        self.storage.is_none() || self.head == self.tail
    }

    /// Whether no further element fits.
    pub fn is_full(&self) -> bool {
        self.next(self.tail) == self.head
    }

    /// Append an element. Refuses (returns `false`, state unchanged)
    /// when the buffer is full.
    pub fn push_back(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }
        // SAFETY: not full, so tail is a free in-bounds slot.
        unsafe { ptr::write(self.element_ptr(self.tail), value) };
        self.tail = self.next(self.tail);
        true
    }

    /// Append an element, discarding the oldest one when full. Returns
    /// `false` if an element was discarded.
    pub fn push_back_force(&mut self, value: T) -> bool {
        let mut fit = true;
        if self.is_full() {
            if self.storage.is_none() {
                return false;
            }
            // Make room, discard the first element.
            self.head = self.next(self.head);
            fit = false;
        }
        // SAFETY: not full any more, so tail is a free in-bounds slot.
        unsafe { ptr::write(self.element_ptr(self.tail), value) };
        self.tail = self.next(self.tail);
        fit
    }

    /// Remove and return the oldest element.
    ///
    /// # Panics
    ///
    /// If the buffer is empty; callers check [`RingBuffer::is_empty`]
    /// first.
    pub fn pop_front(&mut self) -> T {
        assert!(!self.is_empty(), "pop_front on empty ring buffer");
        // SAFETY: not empty, so head is an occupied in-bounds slot.
        let value = unsafe { ptr::read(self.element_ptr(self.head)) };
        self.head = self.next(self.head);
        value
    }

    /// The `idx`-th queued element, counted from the head.
    ///
    /// # Panics
    ///
    /// If `idx >= len()`.
    pub fn get(&self, idx: usize) -> &T {
        assert!(idx < self.len(), "ring buffer index out of bounds");
        let mut slot = self.head + idx;
        if slot >= self.storage_capacity {
            slot -= self.storage_capacity;
        }
        // SAFETY: slot is occupied and in bounds.
        unsafe { &*self.element_ptr(slot) }
    }

    /// The longest contiguous run of free slots starting at the tail,
    /// without advancing it. A DMA engine writes through this run and
    /// commits with [`RingBuffer::advance_write`]. Empty when the
    /// buffer is full or unbacked.
    pub fn insert_position(&mut self) -> &mut [T] {
        if self.storage.is_none() {
            return &mut [];
        }
        let run = if self.head <= self.tail {
            min(self.storage_capacity - self.tail, self.available())
        } else {
            self.head - self.tail - 1
        };
        // SAFETY: `run` slots starting at tail are free and in bounds;
        // the borrow of self keeps the storage exclusive.
        unsafe { slice::from_raw_parts_mut(self.element_ptr(self.tail), run) }
    }

    /// Commit `count` elements previously written through
    /// [`RingBuffer::insert_position`], advancing the tail (wrapping).
    ///
    /// # Panics
    ///
    /// If `count` exceeds the free capacity.
    pub fn advance_write(&mut self, count: usize) {
        assert!(count <= self.available(), "advance_write past capacity");
        self.tail += count;
        if self.tail >= self.storage_capacity {
            self.tail -= self.storage_capacity;
        }
    }

    /// The longest contiguous run of queued elements starting at the
    /// head. Consumers drain through this run and commit with
    /// [`RingBuffer::advance_read`].
    pub fn read_position(&self) -> &[T] {
        if self.storage.is_none() {
            return &[];
        }
        let run = if self.head > self.tail {
            self.storage_capacity - self.head
        } else {
            self.tail - self.head
        };
        // SAFETY: `run` slots starting at head are occupied and in
        // bounds.
        unsafe { slice::from_raw_parts(self.element_ptr(self.head), run) }
    }

    /// Commit `count` elements consumed through
    /// [`RingBuffer::read_position`], advancing the head (wrapping).
    ///
    /// # Panics
    ///
    /// If `count` exceeds the queued length.
    pub fn advance_read(&mut self, count: usize) {
        assert!(count <= self.len(), "advance_read past queued elements");
        self.head += count;
        if self.head >= self.storage_capacity {
            self.head -= self.storage_capacity;
        }
    }

    /// Discard all queued elements.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    fn next(&self, idx: usize) -> usize {
        let idx = idx + 1;
        if idx == self.storage_capacity { 0 } else { idx }
    }

    fn element_ptr(&self, slot: usize) -> *mut T {
        debug_assert!(slot < self.storage_capacity);
        let block = self.storage.as_ref().expect("ring buffer has no storage");
        // SAFETY: slot is within the element count derived from the
        // block length.
        unsafe { block.as_ptr().cast::<T>().add(slot) }
    }
}

impl<T: Copy> Default for RingBuffer<'_, T> {
    fn default() -> Self {
        Self::unbacked()
    }
}

impl<T: Copy> Index<usize> for RingBuffer<'_, T> {
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        self.get(idx)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
