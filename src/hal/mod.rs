//! Hardware Abstraction Layer
//!
//! The portable components in this crate never touch registers
//! directly. Everything MCU-family specific (DMA register layout,
//! request multiplexing, interrupt-vector grouping, NVIC programming,
//! peripheral data-register addresses) sits behind the two capability
//! traits in this module, supplied by composition:
//!
//! - [`DmaHardware`]: one object abstracting the family's DMA engine.
//! - [`PeripheralPort`]: the peripheral side of a transfer pairing
//!   (UART, SPI, I2C instance).
//!
//! A HAL crate implements these once per family; tests implement them
//! with in-memory mocks.

use crate::dma::DmaEvent;

// =============================================================================
// Transfer parameters
// =============================================================================

/// Direction of a DMA transfer relative to memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Peripheral data register to a memory buffer (read).
    PeripheralToMemory,
    /// Memory buffer to a peripheral data register (write).
    MemoryToPeripheral,
}

/// Arbitration priority of a channel inside the DMA engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferPriority {
    /// Lowest arbitration priority.
    Low,
    /// Medium arbitration priority.
    Medium,
    /// High arbitration priority.
    High,
    /// Highest arbitration priority.
    VeryHigh,
}

// =============================================================================
// DMA capability
// =============================================================================

/// Capability surface over one hardware DMA engine.
///
/// Channel numbers are 1-based (`1..=CHANNELS`), matching hardware
/// numbering. Implementations must tolerate being called from both
/// mainline and interrupt context; hence the `Sync` bound.
///
/// Addresses are `usize` so the same trait works on the target and in
/// host-side tests.
pub trait DmaHardware: Sync {
    /// Number of physical channels the engine provides.
    const CHANNELS: u8;

    /// Program direction, increment modes and data width for a
    /// byte-wise transfer on `channel`.
    fn configure_channel(&self, channel: u8, direction: Direction);

    /// Set the channel's arbitration priority.
    fn set_channel_priority(&self, channel: u8, priority: TransferPriority);

    /// Route a peripheral request line to the channel (request mux).
    fn set_request(&self, channel: u8, request: u8);

    /// Set the peripheral-side address (data register).
    fn set_peripheral_address(&self, channel: u8, address: usize);

    /// Set the memory-side address.
    fn set_memory_address(&self, channel: u8, address: usize);

    /// Set the number of data items to move.
    fn set_transfer_length(&self, channel: u8, length: usize);

    /// Number of data items not yet moved by the current transfer.
    fn remaining(&self, channel: u8) -> usize;

    /// Start the channel.
    fn enable_channel(&self, channel: u8);

    /// Stop the channel. Items already latched in the peripheral FIFO
    /// may still drain afterwards.
    fn disable_channel(&self, channel: u8);

    /// Whether the channel is currently started.
    fn channel_enabled(&self, channel: u8) -> bool;

    /// Set the interrupt-enable bit for `event` on `channel`.
    fn enable_event(&self, channel: u8, event: DmaEvent);

    /// Clear the interrupt-enable bit for `event` on `channel`.
    fn disable_event(&self, channel: u8, event: DmaEvent);

    /// Whether the interrupt-enable bit for `event` is set.
    fn event_enabled(&self, channel: u8, event: DmaEvent) -> bool;

    /// Whether the hardware flag for `event` is raised.
    fn event_flagged(&self, channel: u8, event: DmaEvent) -> bool;

    /// Clear the hardware flag for `event`.
    fn clear_event(&self, channel: u8, event: DmaEvent);

    /// Enable the interrupt line covering `channel` at `priority`.
    ///
    /// Lines may be shared between channels (vector grouping is a
    /// family detail); enabling one channel of a group enables the
    /// group's line.
    fn enable_interrupt(&self, channel: u8, priority: u8);

    /// Disable the interrupt line covering `channel`.
    ///
    /// This silences every channel sharing the line.
    fn disable_interrupt(&self, channel: u8);
}

// =============================================================================
// Peripheral capability
// =============================================================================

/// The peripheral half of a DMA transfer pairing.
///
/// One value describes one peripheral instance (a UART, an SPI slave,
/// ...) as seen by the DMA engine.
pub trait PeripheralPort: Send + Sync {
    /// Address of the peripheral's data register, used as the
    /// peripheral-side DMA address for both directions.
    fn data_register_address(&self) -> usize;

    /// Request-mux id of the peripheral's RX line.
    fn rx_request(&self) -> u8;

    /// Request-mux id of the peripheral's TX line.
    fn tx_request(&self) -> u8;

    /// Make the peripheral raise DMA requests when RX data arrives.
    fn enable_rx_requests(&mut self);

    /// Make the peripheral raise DMA requests when TX space frees up.
    fn enable_tx_requests(&mut self);
}
