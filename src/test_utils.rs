//! Testing utilities and mock implementations
//!
//! This module provides mock hardware for testing the resource layer on
//! the host: an in-memory DMA engine and a fake peripheral port.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use core::ptr;
use core::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::vec::Vec;

use crate::dma::{DmaEvent, DmaRegistry};
use crate::hal::{Direction, DmaHardware, PeripheralPort, TransferPriority};
use crate::sync::CriticalSectionCell;

/// Channel count of the mock DMA engine.
pub const MOCK_CHANNELS: usize = 7;

/// Registry over the mock engine, as the tests wire it up.
pub type MockRegistry = DmaRegistry<MockDmaHardware, MOCK_CHANNELS>;

fn event_index(event: DmaEvent) -> usize {
    match event {
        DmaEvent::Half => 0,
        DmaEvent::Complete => 1,
        DmaEvent::Error => 2,
    }
}

// =============================================================================
// Mock DMA engine
// =============================================================================

#[derive(Debug)]
struct MockChannel {
    direction: Option<Direction>,
    priority: Option<TransferPriority>,
    request: Option<u8>,
    peripheral_address: usize,
    memory_address: usize,
    length: usize,
    remaining: usize,
    enabled: bool,
    event_enable: [bool; 3],
    event_flag: [bool; 3],
    irq_priority: Option<u8>,
}

impl MockChannel {
    const fn new() -> Self {
        Self {
            direction: None,
            priority: None,
            request: None,
            peripheral_address: 0,
            memory_address: 0,
            length: 0,
            remaining: 0,
            enabled: false,
            event_enable: [false; 3],
            event_flag: [false; 3],
            irq_priority: None,
        }
    }
}

/// In-memory DMA engine for testing the registry and the transfer
/// engines without hardware.
///
/// Register programming is recorded per channel and can be read back
/// with the accessor methods; `inject_rx` plays the role of the
/// hardware moving peripheral bytes into memory, `collect_tx` reads
/// back what a memory-to-peripheral transfer would have sent.
///
/// # Example
///
/// ```ignore
/// let registry: &'static MockRegistry =
///     Box::leak(Box::new(DmaRegistry::new(MockDmaHardware::new())));
/// let channel = registry.allocate(Some(3)).unwrap();
/// channel.on_complete(|ch| { /* ... */ });
///
/// registry.hardware().raise(3, DmaEvent::Complete);
/// registry.handle_irq(3..=3);
/// ```
pub struct MockDmaHardware {
    channels: [CriticalSectionCell<MockChannel>; MOCK_CHANNELS],
}

impl MockDmaHardware {
    /// Create a mock engine with all channels idle and all flags clear.
    pub const fn new() -> Self {
        Self {
            channels: [const { CriticalSectionCell::new(MockChannel::new()) }; MOCK_CHANNELS],
        }
    }

    fn channel(&self, channel: u8) -> &CriticalSectionCell<MockChannel> {
        assert!(
            channel >= 1 && channel as usize <= MOCK_CHANNELS,
            "invalid channel number"
        );
        &self.channels[channel as usize - 1]
    }

    /// Raise the hardware flag for `event`, as the DMA engine would.
    pub fn raise(&self, channel: u8, event: DmaEvent) {
        self.channel(channel)
            .with(|ch| ch.event_flag[event_index(event)] = true);
    }

    /// Force the remaining-count register, simulating a transfer that
    /// stopped partway.
    pub fn set_remaining(&self, channel: u8, remaining: usize) {
        self.channel(channel).with(|ch| ch.remaining = remaining);
    }

    /// The last programmed (memory address, length) pair.
    pub fn programmed(&self, channel: u8) -> (usize, usize) {
        self.channel(channel).with(|ch| (ch.memory_address, ch.length))
    }

    /// The last configured transfer direction.
    pub fn direction(&self, channel: u8) -> Option<Direction> {
        self.channel(channel).with(|ch| ch.direction)
    }

    /// The last configured arbitration priority.
    pub fn channel_priority(&self, channel: u8) -> Option<TransferPriority> {
        self.channel(channel).with(|ch| ch.priority)
    }

    /// The last routed request-mux id.
    pub fn request(&self, channel: u8) -> Option<u8> {
        self.channel(channel).with(|ch| ch.request)
    }

    /// The last programmed peripheral-side address.
    pub fn peripheral_address(&self, channel: u8) -> usize {
        self.channel(channel).with(|ch| ch.peripheral_address)
    }

    /// The interrupt priority of the channel's line, `None` while the
    /// line is disabled.
    pub fn irq_priority(&self, channel: u8) -> Option<u8> {
        self.channel(channel).with(|ch| ch.irq_priority)
    }

    /// Play the hardware's role for a peripheral-to-memory transfer:
    /// write `data` through the programmed memory address, decrement
    /// the remaining count, and raise the transfer-complete flag at the
    /// end of the burst. A burst shorter than the armed length reads
    /// back as a completion with a nonzero remaining count, the way a
    /// transfer that stopped early does.
    ///
    /// # Panics
    ///
    /// If `data` exceeds the not-yet-transferred length.
    pub fn inject_rx(&self, channel: u8, data: &[u8]) {
        let address = self.channel(channel).with(|ch| {
            assert!(
                data.len() <= ch.remaining,
                "inject exceeds the armed transfer length"
            );
            let offset = ch.length - ch.remaining;
            ch.remaining -= data.len();
            ch.memory_address + offset
        });
        // SAFETY: tests program the memory address from a live Block (or
        // ring-buffer run) that stays allocated while the transfer is in
        // flight, so the destination is valid writable memory.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), address as *mut u8, data.len()) };
        self.raise(channel, DmaEvent::Complete);
    }

    /// Read back the bytes a memory-to-peripheral transfer was
    /// programmed to send.
    pub fn collect_tx(&self, channel: u8) -> Vec<u8> {
        let (address, length) = self.programmed(channel);
        // SAFETY: as in `inject_rx`, the programmed address comes from a
        // live Block owned by the in-flight transfer.
        unsafe { slice::from_raw_parts(address as *const u8, length) }.to_vec()
    }
}

impl Default for MockDmaHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaHardware for MockDmaHardware {
    const CHANNELS: u8 = MOCK_CHANNELS as u8;

    fn configure_channel(&self, channel: u8, direction: Direction) {
        self.channel(channel).with(|ch| ch.direction = Some(direction));
    }

    fn set_channel_priority(&self, channel: u8, priority: TransferPriority) {
        self.channel(channel).with(|ch| ch.priority = Some(priority));
    }

    fn set_request(&self, channel: u8, request: u8) {
        self.channel(channel).with(|ch| ch.request = Some(request));
    }

    fn set_peripheral_address(&self, channel: u8, address: usize) {
        self.channel(channel).with(|ch| ch.peripheral_address = address);
    }

    fn set_memory_address(&self, channel: u8, address: usize) {
        self.channel(channel).with(|ch| ch.memory_address = address);
    }

    fn set_transfer_length(&self, channel: u8, length: usize) {
        self.channel(channel).with(|ch| {
            ch.length = length;
            ch.remaining = length;
        });
    }

    fn remaining(&self, channel: u8) -> usize {
        self.channel(channel).with(|ch| ch.remaining)
    }

    fn enable_channel(&self, channel: u8) {
        self.channel(channel).with(|ch| ch.enabled = true);
    }

    fn disable_channel(&self, channel: u8) {
        self.channel(channel).with(|ch| ch.enabled = false);
    }

    fn channel_enabled(&self, channel: u8) -> bool {
        self.channel(channel).with(|ch| ch.enabled)
    }

    fn enable_event(&self, channel: u8, event: DmaEvent) {
        self.channel(channel)
            .with(|ch| ch.event_enable[event_index(event)] = true);
    }

    fn disable_event(&self, channel: u8, event: DmaEvent) {
        self.channel(channel)
            .with(|ch| ch.event_enable[event_index(event)] = false);
    }

    fn event_enabled(&self, channel: u8, event: DmaEvent) -> bool {
        self.channel(channel)
            .with(|ch| ch.event_enable[event_index(event)])
    }

    fn event_flagged(&self, channel: u8, event: DmaEvent) -> bool {
        self.channel(channel)
            .with(|ch| ch.event_flag[event_index(event)])
    }

    fn clear_event(&self, channel: u8, event: DmaEvent) {
        self.channel(channel)
            .with(|ch| ch.event_flag[event_index(event)] = false);
    }

    fn enable_interrupt(&self, channel: u8, priority: u8) {
        self.channel(channel).with(|ch| ch.irq_priority = Some(priority));
    }

    fn disable_interrupt(&self, channel: u8) {
        self.channel(channel).with(|ch| ch.irq_priority = None);
    }
}

// =============================================================================
// Mock peripheral
// =============================================================================

/// Observable side of a [`MockPeripheral`], shared with the test body.
///
/// Split out so the test can keep a handle on the request-enable state
/// after the peripheral value itself moved into an engine.
#[derive(Debug)]
pub struct PortState {
    rx_requests: AtomicBool,
    tx_requests: AtomicBool,
}

impl PortState {
    pub const fn new() -> Self {
        Self {
            rx_requests: AtomicBool::new(false),
            tx_requests: AtomicBool::new(false),
        }
    }

    /// Whether the peripheral was told to raise RX DMA requests.
    pub fn rx_requests_enabled(&self) -> bool {
        self.rx_requests.load(Ordering::SeqCst)
    }

    /// Whether the peripheral was told to raise TX DMA requests.
    pub fn tx_requests_enabled(&self) -> bool {
        self.tx_requests.load(Ordering::SeqCst)
    }
}

impl Default for PortState {
    fn default() -> Self {
        Self::new()
    }
}

/// Fake byte peripheral (a UART-shaped port) for engine tests.
pub struct MockPeripheral {
    state: &'static PortState,
}

impl MockPeripheral {
    /// Fake data-register address; recorded by the mock engine, never
    /// dereferenced.
    pub const DATA_REGISTER: usize = 0x4000_4404;
    /// Request-mux id of the RX line.
    pub const RX_REQUEST: u8 = 2;
    /// Request-mux id of the TX line.
    pub const TX_REQUEST: u8 = 3;

    pub fn new(state: &'static PortState) -> Self {
        Self { state }
    }
}

impl PeripheralPort for MockPeripheral {
    fn data_register_address(&self) -> usize {
        Self::DATA_REGISTER
    }

    fn rx_request(&self) -> u8 {
        Self::RX_REQUEST
    }

    fn tx_request(&self) -> u8 {
        Self::TX_REQUEST
    }

    fn enable_rx_requests(&mut self) {
        self.state.rx_requests.store(true, Ordering::SeqCst);
    }

    fn enable_tx_requests(&mut self) {
        self.state.tx_requests.store(true, Ordering::SeqCst);
    }
}
