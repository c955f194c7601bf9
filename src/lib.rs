//! Peripheral I/O resource layer
//!
//! A `no_std`, `no_alloc` resource layer for interrupt-driven peripheral
//! I/O on bare-metal MCUs: a deterministic size-classed block pool, a
//! DMA-channel arbiter with interrupt dispatch, a circular buffer usable
//! for zero-copy DMA, and asynchronous transfer engines chaining DMA
//! completions to user callbacks.
//!
//! # Architecture
//!
//! The crate is organized around one execution model: a single mainline
//! instruction stream preempted by hardware interrupt handlers, with no
//! OS, no heap and no scheduler.
//!
//! 1. **Pool** ([`pool`]): fixed size-classed block allocator handing out
//!    RAII [`Block`] handles
//! 2. **DMA** ([`dma`]): channel ownership ([`DmaRegistry`]) and ISR
//!    event dispatch
//! 3. **Transfer** ([`transfer`]): [`ReaderWriter`] block engines plus
//!    buffered/line reception for byte streams
//! 4. **Ring** ([`ring`]): circular queue over a pool block with
//!    contiguous-run access for DMA
//! 5. **HAL** ([`hal`]): capability traits an MCU-family crate
//!    implements ([`DmaHardware`], [`PeripheralPort`])
//!
//! All shared tables live behind [`CriticalSectionCell`]; the
//! `critical-section` crate supplies the interrupt masking on the target
//! and a std implementation in host tests.
//!
//! # Features
//!
//! - `defmt`: enable defmt formatting for event/status types and trace
//!   output on resource-lifecycle edges
//!
//! # Example
//!
//! ```ignore
//! use periph_io::pool::{arena_bytes, slot_count, Pool};
//! use periph_io::{DmaRegistry, ReaderWriter};
//!
//! // Static allocation: one pool, one registry per DMA engine.
//! const CLASSES: &[(usize, usize)] = &[(256, 2), (64, 8)];
//! static POOL: Pool<{ arena_bytes(CLASSES) }, { slot_count(CLASSES) }> =
//!     Pool::new(CLASSES);
//! static DMA: DmaRegistry<FamilyDma, 7> = DmaRegistry::new(FamilyDma::new());
//!
//! // Hardware vector covering channels 4..=7:
//! #[interrupt]
//! fn DMA1_CHANNEL4_7() {
//!     DMA.handle_irq(4..=7);
//! }
//!
//! // Bring-up: claim one channel per direction and bind the peripheral.
//! let rx = DMA.allocate(None).unwrap();
//! let tx = DMA.allocate(None).unwrap();
//! let engine = ENGINE.init(ReaderWriter::new(&DMA, uart2, rx, tx));
//!
//! // Command loop: issue the next read from inside the completion.
//! fn read_command(engine: &'static Engine) {
//!     let block = POOL.allocate(64).unwrap();
//!     engine.read_block(block, 0, 64, move |block, n| {
//!         process(&block.bytes()[..n]);
//!         read_command(engine);
//!     });
//! }
//! ```
//!
//! # Memory Requirements
//!
//! Everything is sized at compile time: the pool arena is
//! `arena_bytes(CLASSES)` bytes plus one `bool` per slot, the registry
//! holds three callback slots per physical channel, and callbacks store
//! their captures inline (no boxing). See [`callback`] for the capture
//! budgets.

#![no_std]
#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here; the Cargo.toml [lints] tables mirror them.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements
)]

// =============================================================================
// Modules
// =============================================================================

pub mod callback;
pub mod dma;
pub mod hal;
pub mod pool;
pub mod ring;
pub mod sync;
pub mod transfer;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod test_utils;

// =============================================================================
// Re-exports
// =============================================================================

pub use callback::{EventFn, TransferFn};
pub use dma::{DmaChannel, DmaEvent, DmaRegistry, EventSet};
pub use hal::{Direction, DmaHardware, PeripheralPort, TransferPriority};
pub use pool::{Block, Pool};
pub use ring::RingBuffer;
pub use sync::{CriticalSectionCell, InterruptGuard};
pub use transfer::{BufferedReader, ByteSource, LineReader, ReaderWriter};
