//! Continuous buffered reception and line assembly.
//!
//! [`BufferedReader`] keeps a DMA channel streaming a byte peripheral
//! into a [`RingBuffer`]: each completed chunk advances the ring's
//! write index and re-arms the channel from interrupt context, so the
//! application consumes bytes at its own pace with [`BufferedReader::pop`].
//!
//! [`LineReader`] sits on any [`ByteSource`] and assembles
//! newline-terminated lines into pool blocks for command-style
//! protocols.

use crate::dma::{DmaChannel, DmaRegistry};
use crate::hal::{DmaHardware, PeripheralPort};
use crate::pool::{Block, Pool};
use crate::ring::RingBuffer;
use crate::sync::CriticalSectionCell;

use super::configure_rx;

/// Upper bound on the chunk length armed per DMA round.
///
/// Small chunks keep latency low between a byte arriving and the
/// completion interrupt publishing it.
pub const READ_CHUNK: usize = 32;

/// Default capacity for [`LineReader`] line blocks.
pub const DEFAULT_LINE_CAPACITY: usize = 256;

/// A draining byte stream.
pub trait ByteSource {
    /// Whether at least one byte is queued.
    fn available(&self) -> bool;

    /// Number of queued bytes.
    fn len(&self) -> usize;

    /// Remove and return the oldest byte; callers check
    /// [`ByteSource::available`] first.
    fn pop(&mut self) -> u8;
}

struct ReaderState {
    ring: RingBuffer<'static, u8>,
    /// Length of the currently armed DMA round; 0 while idle or
    /// stalled on a full ring.
    armed_len: usize,
}

/// Continuous DMA reception into a ring buffer.
///
/// Armed through `&'static self` like the transfer engines: the re-arm
/// handler captures the reader. When the ring fills up, re-arming
/// stalls until [`BufferedReader::pop`] frees space.
pub struct BufferedReader<H, const CHANNELS: usize>
where
    H: DmaHardware + 'static,
{
    registry: &'static DmaRegistry<H, CHANNELS>,
    channel: DmaChannel<'static, H, CHANNELS>,
    state: CriticalSectionCell<ReaderState>,
}

impl<H, const CHANNELS: usize> BufferedReader<H, CHANNELS>
where
    H: DmaHardware + 'static,
{
    /// Bind `port`'s RX side to an owned channel and stage `storage` as
    /// the ring buffer. Reception starts with
    /// [`BufferedReader::start`].
    ///
    /// # Panics
    ///
    /// If the channel was not allocated from `registry`.
    pub fn new<P: PeripheralPort>(
        registry: &'static DmaRegistry<H, CHANNELS>,
        port: &mut P,
        channel: DmaChannel<'static, H, CHANNELS>,
        storage: Block<'static>,
    ) -> Self {
        assert!(
            core::ptr::eq(channel.registry(), registry),
            "channel must come from the reader's registry"
        );
        configure_rx(registry, port, &channel);
        Self {
            registry,
            channel,
            state: CriticalSectionCell::new(ReaderState {
                ring: RingBuffer::new(storage),
                armed_len: 0,
            }),
        }
    }

    /// Arm the first DMA round; reception then sustains itself from
    /// completion interrupts.
    pub fn start(&'static self) {
        self.rearm();
    }

    /// Whether at least one byte is queued.
    pub fn available(&self) -> bool {
        self.state.with(|state| !state.ring.is_empty())
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.state.with(|state| state.ring.len())
    }

    /// Remove and return the oldest byte, un-stalling reception if the
    /// ring had filled up.
    ///
    /// # Panics
    ///
    /// If no byte is queued; callers check [`BufferedReader::available`]
    /// first.
    pub fn pop(&'static self) -> u8 {
        let (value, stalled) = self.state.with(|state| {
            let value = state.ring.pop_front();
            (value, state.armed_len == 0)
        });
        if stalled {
            self.rearm();
        }
        value
    }

    /// Arm the next DMA round into the ring's free run. Does nothing
    /// (stalls) when the ring is full.
    fn rearm(&'static self) {
        let hw = self.registry.hardware();
        let (address, len) = self.state.with(|state| {
            let run = state.ring.insert_position();
            let len = run.len().min(READ_CHUNK);
            state.armed_len = len;
            (run.as_mut_ptr() as usize, len)
        });
        if len == 0 {
            return;
        }
        hw.set_memory_address(self.channel.index(), address);
        hw.set_transfer_length(self.channel.index(), len);
        self.channel.on_complete(move |_| self.refill());
        self.channel.enable();
    }

    /// Completion handler: publish the bytes the hardware moved and
    /// re-arm.
    fn refill(&'static self) {
        self.channel.disable();
        let remaining = self.registry.hardware().remaining(self.channel.index());
        self.state.with(|state| {
            let read = state.armed_len.saturating_sub(remaining);
            state.ring.advance_write(read);
            state.armed_len = 0;
        });
        self.rearm();
    }
}

impl<H, const CHANNELS: usize> ByteSource for &'static BufferedReader<H, CHANNELS>
where
    H: DmaHardware + 'static,
{
    fn available(&self) -> bool {
        BufferedReader::available(self)
    }

    fn len(&self) -> usize {
        BufferedReader::len(self)
    }

    fn pop(&mut self) -> u8 {
        BufferedReader::pop(*self)
    }
}

/// Assembles newline-terminated lines from a [`ByteSource`] into pool
/// blocks.
///
/// Lines are NUL-terminated inside the block and truncated to the line
/// capacity; the trailing newline is not stored. Runs entirely in
/// mainline context.
pub struct LineReader<'p, S, const BYTES: usize, const SLOTS: usize> {
    source: S,
    pool: &'p Pool<BYTES, SLOTS>,
    line: Option<Block<'p>>,
    position: usize,
    ready: bool,
    line_capacity: usize,
}

impl<'p, S, const BYTES: usize, const SLOTS: usize> LineReader<'p, S, BYTES, SLOTS>
where
    S: ByteSource,
{
    /// Read lines of up to `line_capacity - 1` bytes (one byte is
    /// reserved for the NUL terminator), allocating each line block
    /// from `pool`.
    pub fn new(source: S, pool: &'p Pool<BYTES, SLOTS>, line_capacity: usize) -> Self {
        assert!(line_capacity >= 2, "line capacity too small");
        Self {
            source,
            pool,
            line: None,
            position: 0,
            ready: false,
            line_capacity,
        }
    }

    /// Pump the source; `true` once a complete line is buffered.
    ///
    /// Returns `false` both while the line is still incomplete and when
    /// the pool cannot currently serve a line block (retry later).
    pub fn available(&mut self) -> bool {
        if self.ready {
            return true;
        }
        if self.line.is_none() {
            let Some(block) = self.pool.allocate(self.line_capacity) else {
                return false;
            };
            self.line = Some(block);
            self.position = 0;
        }
        while self.source.available() {
            let byte = self.source.pop();
            let line = self.line.as_mut().expect("line block present");
            if byte == b'\n' {
                line.write_at::<u8>(self.position, 0);
                self.ready = true;
                break;
            }
            if self.position < self.line_capacity - 1 {
                line.write_at::<u8>(self.position, byte);
                self.position += 1;
            }
        }
        self.ready
    }

    /// Take the buffered line.
    ///
    /// # Panics
    ///
    /// If no line is ready; callers check [`LineReader::available`]
    /// first.
    pub fn take_line(&mut self) -> Block<'p> {
        assert!(self.ready, "no complete line buffered");
        self.ready = false;
        self.position = 0;
        self.line.take().expect("line block present")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
