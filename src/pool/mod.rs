//! Size-classed block pool.
//!
//! A deterministic, heap-free allocator: a fixed set of size classes,
//! each backed by a fixed number of slots inside one statically sized
//! arena. [`Pool::allocate`] hands out [`Block`] handles; dropping a
//! block returns its slot. There is no fragmentation beyond the class
//! granularity and no allocation ever blocks.
//!
//! The pool is an explicit object rather than a hidden static, so tests
//! construct fresh instances; production code typically places one in a
//! `static`:
//!
//! ```ignore
//! use periph_io::pool::{Pool, arena_bytes, slot_count};
//!
//! const CLASSES: &[(usize, usize)] = &[(128, 4), (64, 8), (32, 16)];
//! static POOL: Pool<{ arena_bytes(CLASSES) }, { slot_count(CLASSES) }> =
//!     Pool::new(CLASSES);
//!
//! let block = POOL.allocate(100);
//! ```
//!
//! Allocation policy: among the classes large enough for the request,
//! the smallest is tried first and larger classes serve as fallback.
//! This keeps large blocks free for large requests at the cost of a
//! slightly longer scan.

mod block;

pub use block::Block;
pub(crate) use block::PoolBackend;

use core::cell::UnsafeCell;

use crate::sync::CriticalSectionCell;

/// Maximum number of size classes one pool can hold.
pub const MAX_CLASSES: usize = 8;

/// Every slot start is aligned to this; block sizes are rounded up to a
/// multiple of it when the arena is laid out.
pub const SLOT_ALIGN: usize = 8;

const fn stride_of(block_size: usize) -> usize {
    (block_size + SLOT_ALIGN - 1) & !(SLOT_ALIGN - 1)
}

/// Arena size in bytes required for a class list; use as the `BYTES`
/// parameter of [`Pool`].
pub const fn arena_bytes(classes: &[(usize, usize)]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < classes.len() {
        total += stride_of(classes[i].0) * classes[i].1;
        i += 1;
    }
    total
}

/// Total slot count of a class list; use as the `SLOTS` parameter of
/// [`Pool`].
pub const fn slot_count(classes: &[(usize, usize)]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < classes.len() {
        total += classes[i].1;
        i += 1;
    }
    total
}

#[derive(Debug, Clone, Copy)]
struct ClassDesc {
    block_size: usize,
    slots: usize,
    stride: usize,
    byte_offset: usize,
    slot_base: usize,
}

impl ClassDesc {
    const EMPTY: Self = Self {
        block_size: 0,
        slots: 0,
        stride: 0,
        byte_offset: 0,
        slot_base: 0,
    };
}

#[repr(C, align(8))]
struct Arena<const BYTES: usize> {
    bytes: [u8; BYTES],
}

/// Fixed-size block pool over `BYTES` bytes of storage and `SLOTS`
/// slots.
///
/// Compute the const parameters with [`arena_bytes`] and [`slot_count`]
/// from the class list passed to [`Pool::new`]; a mismatch fails the
/// constructor.
pub struct Pool<const BYTES: usize, const SLOTS: usize> {
    classes: [ClassDesc; MAX_CLASSES],
    class_count: usize,
    largest: usize,
    taken: CriticalSectionCell<[bool; SLOTS]>,
    storage: UnsafeCell<Arena<BYTES>>,
}

// SAFETY: the slot table lives in a CriticalSectionCell, and arena
// bytes are only reachable through Block handles whose slots the table
// marks taken: at most one live handle per slot.
unsafe impl<const BYTES: usize, const SLOTS: usize> Sync for Pool<BYTES, SLOTS> {}

impl<const BYTES: usize, const SLOTS: usize> Pool<BYTES, SLOTS> {
    /// Build a pool over a strictly descending `(block_size,
    /// slot_count)` class list. Const, suitable for `static` placement.
    ///
    /// # Panics
    ///
    /// If the list is empty, exceeds [`MAX_CLASSES`], is not strictly
    /// descending in block size, contains a zero size or count, or does
    /// not match the `BYTES`/`SLOTS` parameters.
    pub const fn new(classes: &[(usize, usize)]) -> Self {
        assert!(!classes.is_empty(), "pool needs at least one size class");
        assert!(classes.len() <= MAX_CLASSES, "too many size classes");

        let mut descs = [ClassDesc::EMPTY; MAX_CLASSES];
        let mut byte_offset = 0;
        let mut slot_base = 0;
        let mut i = 0;
        while i < classes.len() {
            let (block_size, slots) = classes[i];
            assert!(block_size > 0, "class block size must be nonzero");
            assert!(slots > 0, "class slot count must be nonzero");
            if i > 0 {
                assert!(
                    block_size < classes[i - 1].0,
                    "classes must be strictly descending in block size"
                );
            }
            descs[i] = ClassDesc {
                block_size,
                slots,
                stride: stride_of(block_size),
                byte_offset,
                slot_base,
            };
            byte_offset += stride_of(block_size) * slots;
            slot_base += slots;
            i += 1;
        }
        assert!(byte_offset == BYTES, "BYTES must equal arena_bytes(classes)");
        assert!(slot_base == SLOTS, "SLOTS must equal slot_count(classes)");

        Self {
            classes: descs,
            class_count: classes.len(),
            largest: classes[0].0,
            taken: CriticalSectionCell::new([false; SLOTS]),
            storage: UnsafeCell::new(Arena { bytes: [0; BYTES] }),
        }
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// Returns `None` for a zero-sized request, a request larger than
    /// the largest class, or when every covering class is exhausted.
    /// Never blocks; safe to call with transfers in flight. The scan
    /// and the taken-mark execute in one critical section because
    /// blocks are freed from completion callbacks in interrupt context.
    pub fn allocate(&self, size: usize) -> Option<Block<'_>> {
        if size == 0 || size > self.largest {
            return None;
        }

        let found = self.taken.with(|taken| {
            // Classes are stored descending; walking backwards tries
            // the smallest covering class first, larger ones as
            // fallback.
            let mut ci = self.class_count;
            while ci > 0 {
                ci -= 1;
                let class = &self.classes[ci];
                if class.block_size < size {
                    continue;
                }
                for slot in 0..class.slots {
                    if !taken[class.slot_base + slot] {
                        taken[class.slot_base + slot] = true;
                        return Some((ci as u8, slot as u16));
                    }
                }
            }
            None
        });

        match found {
            Some((class, slot)) => Some(Block::new(self, class, slot)),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("pool exhausted for {=usize}-byte request", size);
                None
            }
        }
    }

    /// Size of the largest class, the upper bound on `allocate`
    /// requests.
    pub fn largest_block(&self) -> usize {
        self.largest
    }

    /// Number of currently untaken slots across all classes.
    pub fn free_slots(&self) -> usize {
        self.taken
            .with(|taken| taken.iter().filter(|taken| !**taken).count())
    }

    fn class(&self, class: u8) -> &ClassDesc {
        assert!((class as usize) < self.class_count, "invalid class index");
        &self.classes[class as usize]
    }
}

impl<const BYTES: usize, const SLOTS: usize> PoolBackend for Pool<BYTES, SLOTS> {
    fn block_size(&self, class: u8) -> usize {
        self.class(class).block_size
    }

    fn slot_ptr(&self, class: u8, slot: u16) -> *mut u8 {
        let class = self.class(class);
        assert!((slot as usize) < class.slots, "invalid slot index");
        let offset = class.byte_offset + class.stride * slot as usize;
        // SAFETY: the offset stays inside the arena by construction of
        // the class layout; the raw ref never materializes a reference
        // to the whole arena, so outstanding block borrows stay valid.
        unsafe { (&raw mut (*self.storage.get()).bytes).cast::<u8>().add(offset) }
    }

    fn release(&self, class: u8, slot: u16) {
        let index = self.class(class).slot_base + slot as usize;
        self.taken.with(|taken| {
            assert!(taken[index], "releasing a slot that is not taken");
            taken[index] = false;
        });
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]
mod tests {
    extern crate std;

    use super::*;

    const CLASSES: &[(usize, usize)] = &[(128, 2), (64, 2), (32, 4)];
    type TestPool = Pool<{ arena_bytes(CLASSES) }, { slot_count(CLASSES) }>;

    fn pool() -> TestPool {
        Pool::new(CLASSES)
    }

    #[test]
    fn layout_helpers() {
        assert_eq!(arena_bytes(CLASSES), 128 * 2 + 64 * 2 + 32 * 4);
        assert_eq!(slot_count(CLASSES), 8);
        // Odd sizes round up to the slot alignment.
        assert_eq!(arena_bytes(&[(30, 2)]), 64);
    }

    #[test]
    fn allocate_zero_fails() {
        let pool = pool();
        assert!(pool.allocate(0).is_none());
    }

    #[test]
    fn allocate_over_largest_fails() {
        let pool = pool();
        assert!(pool.allocate(129).is_none());
        assert!(pool.allocate(usize::MAX).is_none());
    }

    #[test]
    fn allocate_exact_largest_succeeds() {
        let pool = pool();
        let block = pool.allocate(128).unwrap();
        assert_eq!(block.len(), 128);
    }

    #[test]
    fn smallest_covering_class_first() {
        let pool = pool();
        // 20 bytes fits the 32-byte class; both 32-slots drain before
        // any larger class is touched.
        let a = pool.allocate(20).unwrap();
        let b = pool.allocate(20).unwrap();
        let c = pool.allocate(20).unwrap();
        let d = pool.allocate(20).unwrap();
        assert_eq!(a.len(), 32);
        assert_eq!(d.len(), 32);

        // Fifth small request falls back to the 64-byte class.
        let e = pool.allocate(20).unwrap();
        assert_eq!(e.len(), 64);
        drop((a, b, c, d, e));
    }

    #[test]
    fn fallback_chain_exhausts_upwards() {
        const SMALL: &[(usize, usize)] = &[(64, 1), (32, 1)];
        let pool: Pool<{ arena_bytes(SMALL) }, { slot_count(SMALL) }> = Pool::new(SMALL);

        let first = pool.allocate(16).unwrap();
        assert_eq!(first.len(), 32);
        let second = pool.allocate(16).unwrap();
        assert_eq!(second.len(), 64);
        assert!(pool.allocate(16).is_none());
        drop(first);
        assert_eq!(pool.allocate(16).unwrap().len(), 32);
        drop(second);
    }

    #[test]
    fn class_slots_are_distinct_and_exhaust() {
        let pool = pool();
        let a = pool.allocate(32).unwrap();
        let b = pool.allocate(32).unwrap();
        let c = pool.allocate(32).unwrap();
        let d = pool.allocate(32).unwrap();
        let ptrs = [a.as_ptr(), b.as_ptr(), c.as_ptr(), d.as_ptr()];
        for i in 0..ptrs.len() {
            for j in i + 1..ptrs.len() {
                assert_ne!(ptrs[i], ptrs[j], "slots must not alias");
            }
        }
        drop((a, b, c, d));
    }

    #[test]
    fn drop_returns_slot() {
        let pool = pool();
        assert_eq!(pool.free_slots(), 8);
        let block = pool.allocate(100).unwrap();
        assert_eq!(pool.free_slots(), 7);
        drop(block);
        assert_eq!(pool.free_slots(), 8);
    }

    #[test]
    fn scenario_one_class_pool() {
        // One class (size 32, count 2): allocate(10) -> A,
        // allocate(32) -> B != A, allocate(1) exhausted; dropping A
        // makes room again and the freed slot may be reused.
        const ONE: &[(usize, usize)] = &[(32, 2)];
        let pool: Pool<{ arena_bytes(ONE) }, { slot_count(ONE) }> = Pool::new(ONE);

        let a = pool.allocate(10).unwrap();
        let b = pool.allocate(32).unwrap();
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert!(pool.allocate(1).is_none());

        let a_ptr = a.as_ptr();
        drop(a);
        let again = pool.allocate(16).unwrap();
        assert_eq!(again.as_ptr(), a_ptr);
        drop((b, again));
    }

    #[test]
    fn blocks_are_byte_addressable() {
        let pool = pool();
        let mut block = pool.allocate(64).unwrap();
        block.bytes_mut().fill(0xAA);
        assert!(block.bytes().iter().all(|b| *b == 0xAA));
        block.bytes_mut()[3] = 7;
        assert_eq!(block.bytes()[3], 7);
    }

    #[test]
    fn typed_views_round_values() {
        let pool = pool();
        let mut block = pool.allocate(32).unwrap();
        // A length-prefixed payload header, the way protocol callers
        // use blocks.
        block.write_at::<u16>(0, 1);
        block.write_at::<u16>(2, 0x1234);
        block.write_at::<u32>(4, 0xDEAD_BEEF);
        assert_eq!(block.read_at::<u16>(0), 1);
        assert_eq!(block.read_at::<u16>(2), 0x1234);
        assert_eq!(block.read_at::<u32>(4), 0xDEAD_BEEF);
    }

    #[test]
    fn typed_views_tolerate_unaligned_offsets() {
        let pool = pool();
        let mut block = pool.allocate(32).unwrap();
        block.write_at::<u32>(1, 0x0102_0304);
        assert_eq!(block.read_at::<u32>(1), 0x0102_0304);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn typed_view_past_end_panics() {
        let pool = pool();
        let block = pool.allocate(32).unwrap();
        let _ = block.read_at::<u32>(30);
    }

    #[test]
    fn slots_are_aligned() {
        const ODD: &[(usize, usize)] = &[(48, 2), (12, 3)];
        let pool: Pool<{ arena_bytes(ODD) }, { slot_count(ODD) }> = Pool::new(ODD);
        let a = pool.allocate(12).unwrap();
        let b = pool.allocate(12).unwrap();
        assert_eq!(a.as_ptr() as usize % SLOT_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % SLOT_ALIGN, 0);
        drop((a, b));
    }
}
