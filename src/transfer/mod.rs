//! Asynchronous block transfer engines.
//!
//! [`ReaderWriter`] chains DMA transfers to user callbacks: the caller
//! hands a [`Block`] in, the hardware moves the bytes, and the
//! completion interrupt hands the block back together with the number
//! of bytes actually transferred. There is no task runtime underneath:
//! "suspension" is returning to the caller, and "resumption" is the
//! ISR invoking the stored callback.
//!
//! Engines are armed through `&'static self`: completion handlers
//! capture a reference to the engine and outlive the arming call, so
//! armed engines live in `static`s (or are leaked in tests), the same
//! discipline the rest of the crate uses for ISR-visible objects.
//!
//! [`BufferedReader`] and [`LineReader`] (see [`buffered`]) layer a
//! ring buffer and line assembly on top for byte-stream peripherals.

mod buffered;

pub use buffered::{
    BufferedReader, ByteSource, DEFAULT_LINE_CAPACITY, LineReader, READ_CHUNK,
};

use core::ptr;

use crate::callback::TransferFn;
use crate::dma::{DmaChannel, DmaRegistry};
use crate::hal::{Direction, DmaHardware, PeripheralPort, TransferPriority};
use crate::pool::Block;
use crate::sync::CriticalSectionCell;

/// Interrupt priority used for transfer channels.
pub const DEFAULT_IRQ_PRIORITY: u8 = 0;

struct Pending {
    block: Block<'static>,
    requested: usize,
    callback: TransferFn<'static>,
}

/// Program a channel for peripheral-to-memory byte transfers and route
/// the peripheral's RX requests to it.
pub(crate) fn configure_rx<H, P, const CHANNELS: usize>(
    registry: &DmaRegistry<H, CHANNELS>,
    port: &mut P,
    channel: &DmaChannel<'_, H, CHANNELS>,
) where
    H: DmaHardware,
    P: PeripheralPort,
{
    let hw = registry.hardware();
    hw.configure_channel(channel.index(), Direction::PeripheralToMemory);
    hw.set_channel_priority(channel.index(), TransferPriority::Low);
    hw.set_request(channel.index(), port.rx_request());
    hw.set_peripheral_address(channel.index(), port.data_register_address());
    port.enable_rx_requests();
    channel.enable_interrupt(DEFAULT_IRQ_PRIORITY);
}

/// Program a channel for memory-to-peripheral byte transfers and route
/// the peripheral's TX requests to it.
pub(crate) fn configure_tx<H, P, const CHANNELS: usize>(
    registry: &DmaRegistry<H, CHANNELS>,
    port: &mut P,
    channel: &DmaChannel<'_, H, CHANNELS>,
) where
    H: DmaHardware,
    P: PeripheralPort,
{
    let hw = registry.hardware();
    hw.configure_channel(channel.index(), Direction::MemoryToPeripheral);
    hw.set_channel_priority(channel.index(), TransferPriority::Low);
    hw.set_request(channel.index(), port.tx_request());
    hw.set_peripheral_address(channel.index(), port.data_register_address());
    port.enable_tx_requests();
    channel.enable_interrupt(DEFAULT_IRQ_PRIORITY);
}

/// Bidirectional block transfer engine over one peripheral.
///
/// Owns one DMA channel per direction. At most one transfer per
/// direction may be in flight; issuing a second before the first's
/// callback fired is a fatal caller error. Exactly one callback firing
/// is guaranteed per accepted transfer, including under
/// [`ReaderWriter::abort_rx`] / [`ReaderWriter::abort_tx`].
pub struct ReaderWriter<H, P, const CHANNELS: usize>
where
    H: DmaHardware + 'static,
    P: PeripheralPort + 'static,
{
    registry: &'static DmaRegistry<H, CHANNELS>,
    #[allow(dead_code)]
    port: P,
    rx: DmaChannel<'static, H, CHANNELS>,
    tx: DmaChannel<'static, H, CHANNELS>,
    rx_pending: CriticalSectionCell<Option<Pending>>,
    tx_pending: CriticalSectionCell<Option<Pending>>,
}

impl<H, P, const CHANNELS: usize> ReaderWriter<H, P, CHANNELS>
where
    H: DmaHardware + 'static,
    P: PeripheralPort + 'static,
{
    /// Bind `port` to two owned channels of `registry` and program both
    /// directions.
    ///
    /// # Panics
    ///
    /// If either channel was not allocated from `registry`.
    pub fn new(
        registry: &'static DmaRegistry<H, CHANNELS>,
        mut port: P,
        rx: DmaChannel<'static, H, CHANNELS>,
        tx: DmaChannel<'static, H, CHANNELS>,
    ) -> Self {
        assert!(
            ptr::eq(rx.registry(), registry) && ptr::eq(tx.registry(), registry),
            "channels must come from the engine's registry"
        );

        configure_rx(registry, &mut port, &rx);
        configure_tx(registry, &mut port, &tx);

        Self {
            registry,
            port,
            rx,
            tx,
            rx_pending: CriticalSectionCell::new(None),
            tx_pending: CriticalSectionCell::new(None),
        }
    }

    /// Start a peripheral-to-memory transfer into `block`.
    ///
    /// Takes ownership of `block` for the duration of the transfer; the
    /// callback receives it back together with the byte count actually
    /// read. The callback runs in interrupt context (or synchronously
    /// from [`ReaderWriter::abort_rx`]) and must not block.
    ///
    /// # Panics
    ///
    /// If the range exceeds the block or a read is already in flight.
    pub fn read_block<F>(&'static self, block: Block<'static>, offset: usize, len: usize, callback: F)
    where
        F: FnOnce(Block<'static>, usize) + Send + 'static,
    {
        assert!(offset + len <= block.len(), "transfer range out of block bounds");
        let address = block.as_ptr() as usize + offset;

        // Claim the direction before touching any register, so a
        // double-start halts without clobbering the in-flight transfer.
        self.rx_pending.with(|pending| {
            assert!(pending.is_none(), "read transfer already in flight");
            *pending = Some(Pending {
                block,
                requested: len,
                callback: TransferFn::new(callback),
            });
        });

        let hw = self.registry.hardware();
        self.rx.disable();
        hw.set_memory_address(self.rx.index(), address);
        hw.set_transfer_length(self.rx.index(), len);
        self.rx.on_complete(move |_| self.finish_rx());
        self.rx.enable();
    }

    /// Start a memory-to-peripheral transfer out of `block`.
    ///
    /// Symmetric to [`ReaderWriter::read_block`]; the callback receives
    /// the block back with the byte count actually written.
    ///
    /// # Panics
    ///
    /// If the range exceeds the block or a write is already in flight.
    pub fn write_block<F>(&'static self, block: Block<'static>, offset: usize, len: usize, callback: F)
    where
        F: FnOnce(Block<'static>, usize) + Send + 'static,
    {
        assert!(offset + len <= block.len(), "transfer range out of block bounds");
        let address = block.as_ptr() as usize + offset;

        self.tx_pending.with(|pending| {
            assert!(pending.is_none(), "write transfer already in flight");
            *pending = Some(Pending {
                block,
                requested: len,
                callback: TransferFn::new(callback),
            });
        });

        let hw = self.registry.hardware();
        self.tx.disable();
        hw.set_memory_address(self.tx.index(), address);
        hw.set_transfer_length(self.tx.index(), len);
        self.tx.on_complete(move |_| self.finish_tx());
        self.tx.enable();
    }

    /// Abort the in-flight read, if any.
    ///
    /// Synchronous: the pending callback is invoked before this returns,
    /// reporting however many bytes had already arrived, and block
    /// ownership goes back to the caller. A no-op when no read is in
    /// flight. Bytes already latched in the peripheral FIFO may still
    /// be delivered to the (now disabled) channel's address.
    pub fn abort_rx(&self) {
        self.rx.abort();
    }

    /// Abort the in-flight write, if any. See [`ReaderWriter::abort_rx`].
    pub fn abort_tx(&self) {
        self.tx.abort();
    }

    /// Install the RX channel's transfer-error handler (caller-defined
    /// recovery, typically abort and restart).
    pub fn on_rx_error<F>(&self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.rx.on_error(handler);
    }

    /// Install the TX channel's transfer-error handler.
    pub fn on_tx_error<F>(&self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.tx.on_error(handler);
    }

    fn finish_rx(&self) {
        self.rx.disable();
        let remaining = self.registry.hardware().remaining(self.rx.index());
        let pending = self.rx_pending.with(|pending| pending.take());
        if let Some(pending) = pending {
            let moved = pending.requested.saturating_sub(remaining);
            pending.callback.invoke(pending.block, moved);
        }
    }

    fn finish_tx(&self) {
        self.tx.disable();
        let remaining = self.registry.hardware().remaining(self.tx.index());
        let pending = self.tx_pending.with(|pending| pending.take());
        if let Some(pending) = pending {
            let moved = pending.requested.saturating_sub(remaining);
            pending.callback.invoke(pending.block, moved);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
