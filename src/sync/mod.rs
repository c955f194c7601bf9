//! Interrupt-safe synchronization primitives.
//!
//! There is no scheduler in this crate's execution model: a single
//! mainline instruction stream is preempted by hardware interrupt
//! handlers. Every table that both contexts mutate goes through the
//! primitives in this module.
//!
//! - [`CriticalSectionCell`]: closure-scoped exclusive access, the
//!   preferred form for single-step updates.
//! - [`InterruptGuard`]: RAII critical section for code that needs an
//!   explicit scope.

pub mod primitives;

pub use primitives::{CriticalSectionCell, InterruptGuard};
