//! Critical-section cell and RAII interrupt guard.
//!
//! Low-level primitives used by the pool, the channel registry and the
//! transfer engines to protect shared tables from ISR preemption.

use core::cell::RefCell;
use core::marker::PhantomData;
use critical_section::Mutex;

/// Cell providing interior mutability with critical section protection.
///
/// Combines `critical_section::Mutex` with `RefCell` for safe mutable
/// access from both mainline code and interrupt handlers.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell (const, suitable for static initialization).
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Execute a closure with exclusive mutable access.
    ///
    /// Interrupts are disabled for the duration of the closure. Keep the
    /// closure short: while it runs, all interrupt-driven I/O is stalled
    /// system-wide.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    /// Try to execute a closure, returning `None` if already borrowed.
    #[inline]
    pub fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow_mut()
                .ok()
                .map(|mut value| f(&mut value))
        })
    }
}

// SAFETY: all access to the inner value happens inside a critical
// section, so references never escape and cannot alias across contexts.
// T: Send because the value is handed between mainline and ISR context.
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}

/// RAII critical section: interrupts are masked from construction to
/// drop.
///
/// The guard stores the restore token returned by
/// [`critical_section::acquire`], so nesting two guards is well defined:
/// dropping the inner guard restores the (still masked) outer state, and
/// only the outermost drop re-enables interrupts.
///
/// Hold guards for the shortest bounded duration possible; all
/// interrupt-driven I/O is stalled while one is alive.
#[must_use = "interrupts are re-enabled when the guard is dropped"]
pub struct InterruptGuard {
    restore: critical_section::RestoreState,
    // Restore must happen on the context that acquired.
    _not_send: PhantomData<*mut ()>,
}

impl InterruptGuard {
    /// Mask interrupts and record the prior state.
    #[inline]
    pub fn new() -> Self {
        Self {
            // SAFETY: the token is released exactly once, in Drop, in
            // reverse acquisition order (guards are scope-bound and
            // !Send).
            restore: unsafe { critical_section::acquire() },
            _not_send: PhantomData,
        }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `restore` came from the acquire in `new` and is
        // released exactly once.
        unsafe { critical_section::release(self.restore) }
    }
}
