//! DMA channel ownership and interrupt dispatch.
//!
//! [`DmaRegistry`] arbitrates a small fixed set of physical DMA
//! channels: each channel carries an availability flag and up to three
//! event handlers (half, complete, error). [`DmaRegistry::allocate`]
//! hands out move-only [`DmaChannel`] handles; dropping a handle makes
//! the channel available again.
//!
//! The registry is an explicit object (no hidden statics); production
//! code places it in a `static` next to the hardware vector table:
//!
//! ```ignore
//! static DMA: DmaRegistry<Stm32Dma, 7> = DmaRegistry::new(Stm32Dma::new());
//!
//! // Vector covering channels 4..=7:
//! #[interrupt]
//! fn DMA1_CH4_7() {
//!     DMA.handle_irq(4..=7);
//! }
//! ```
//!
//! Handler tables are mutated from mainline code (installing callbacks)
//! and read from ISR context (dispatch); every access goes through a
//! critical section, and no user callback ever runs while the table is
//! borrowed.

mod event;

pub use event::{DmaEvent, EventSet};

use crate::callback::EventFn;
use crate::hal::DmaHardware;
use crate::sync::CriticalSectionCell;

struct ChannelEntry {
    available: bool,
    half: Option<EventFn>,
    complete: Option<EventFn>,
    error: Option<EventFn>,
}

impl ChannelEntry {
    const fn new() -> Self {
        Self {
            available: true,
            half: None,
            complete: None,
            error: None,
        }
    }

    fn slot_mut(&mut self, event: DmaEvent) -> &mut Option<EventFn> {
        match event {
            DmaEvent::Half => &mut self.half,
            DmaEvent::Complete => &mut self.complete,
            DmaEvent::Error => &mut self.error,
        }
    }
}

/// Ownership table and ISR dispatcher over one hardware DMA engine.
///
/// `CHANNELS` must equal the hardware's physical channel count; channel
/// numbers are 1-based.
pub struct DmaRegistry<H: DmaHardware, const CHANNELS: usize> {
    hw: H,
    channels: [CriticalSectionCell<ChannelEntry>; CHANNELS],
}

impl<H: DmaHardware, const CHANNELS: usize> DmaRegistry<H, CHANNELS> {
    /// Build a registry over `hw`. Const, suitable for `static`
    /// placement.
    ///
    /// # Panics
    ///
    /// If `CHANNELS` does not match the hardware's channel count.
    pub const fn new(hw: H) -> Self {
        assert!(
            CHANNELS == H::CHANNELS as usize,
            "CHANNELS must match the hardware channel count"
        );
        Self {
            hw,
            channels: [const { CriticalSectionCell::new(ChannelEntry::new()) }; CHANNELS],
        }
    }

    /// The hardware capability object.
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    /// Claim a channel.
    ///
    /// `Some(n)` requests physical channel `n` and fails (`None`) if it
    /// is currently owned; `None` scans for the first available
    /// channel. An out-of-range channel number is a fatal caller error.
    pub fn allocate(&self, which: Option<u8>) -> Option<DmaChannel<'_, H, CHANNELS>> {
        match which {
            Some(index) => self.try_claim(index),
            None => (1..=CHANNELS as u8).find_map(|index| self.try_claim(index)),
        }
    }

    fn try_claim(&self, index: u8) -> Option<DmaChannel<'_, H, CHANNELS>> {
        let claimed = self.entry(index).with(|entry| {
            if entry.available {
                entry.available = false;
                true
            } else {
                false
            }
        });
        if claimed {
            #[cfg(feature = "defmt")]
            defmt::trace!("dma channel {=u8} claimed", index);
            Some(DmaChannel {
                registry: self,
                index,
            })
        } else {
            None
        }
    }

    /// Dispatch pending events for the channels covered by one
    /// interrupt vector.
    ///
    /// For every channel, each event whose interrupt is enabled *and*
    /// whose hardware flag is raised gets its flag cleared first and
    /// its handler invoked second; clearing before invoking prevents
    /// re-entrant re-firing when the handler returns.
    pub fn handle_irq(&self, channels: impl IntoIterator<Item = u8>) {
        for channel in channels {
            for event in DmaEvent::ALL {
                if self.hw.event_enabled(channel, event) && self.hw.event_flagged(channel, event) {
                    self.hw.clear_event(channel, event);
                    self.fire(channel, event);
                }
            }
        }
    }

    /// Invoke the handler installed for `(channel, event)`, if any.
    ///
    /// The handler is taken out of the table for the duration of the
    /// call, so it may install a replacement for itself (the
    /// replacement wins); no table borrow is held while user code runs.
    fn fire(&self, channel: u8, event: DmaEvent) {
        let taken = self.entry(channel).with(|entry| entry.slot_mut(event).take());
        if let Some(mut handler) = taken {
            handler.invoke(channel);
            self.entry(channel).with(|entry| {
                let slot = entry.slot_mut(event);
                if slot.is_none() {
                    *slot = Some(handler);
                }
            });
        }
    }

    fn install(&self, channel: u8, event: DmaEvent, handler: EventFn) {
        self.entry(channel)
            .with(|entry| *entry.slot_mut(event) = Some(handler));
        self.hw.enable_event(channel, event);
    }

    fn release(&self, channel: u8) {
        self.entry(channel).with(|entry| {
            debug_assert!(!entry.available, "releasing an unowned channel");
            entry.available = true;
        });
        #[cfg(feature = "defmt")]
        defmt::trace!("dma channel {=u8} released", channel);
    }

    fn entry(&self, channel: u8) -> &CriticalSectionCell<ChannelEntry> {
        assert!(
            channel >= 1 && channel as usize <= CHANNELS,
            "invalid channel number"
        );
        &self.channels[channel as usize - 1]
    }
}

/// Move-only handle to one owned DMA channel.
///
/// Dropping the handle returns the channel to the registry. The drop
/// does **not** stop the hardware: abort any in-flight transfer first.
pub struct DmaChannel<'r, H: DmaHardware, const CHANNELS: usize> {
    registry: &'r DmaRegistry<H, CHANNELS>,
    index: u8,
}

impl<'r, H: DmaHardware, const CHANNELS: usize> DmaChannel<'r, H, CHANNELS> {
    /// The 1-based physical channel number.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub(crate) fn registry(&self) -> &'r DmaRegistry<H, CHANNELS> {
        self.registry
    }

    /// Enable the interrupt line covering this channel at `priority`.
    pub fn enable_interrupt(&self, priority: u8) {
        self.registry.hw.enable_interrupt(self.index, priority);
    }

    /// Disable the interrupt line covering this channel.
    ///
    /// Channels sharing the line go silent too.
    pub fn disable_interrupt(&self) {
        self.registry.hw.disable_interrupt(self.index);
    }

    /// Install the half-transfer handler (replacing any previous one)
    /// and enable the matching interrupt.
    pub fn on_half<F>(&self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.registry
            .install(self.index, DmaEvent::Half, EventFn::new(handler));
    }

    /// Stop half-transfer events from firing; the handler stays
    /// installed.
    pub fn disable_on_half(&self) {
        self.registry.hw.disable_event(self.index, DmaEvent::Half);
    }

    /// Install the transfer-complete handler (replacing any previous
    /// one) and enable the matching interrupt.
    pub fn on_complete<F>(&self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.registry
            .install(self.index, DmaEvent::Complete, EventFn::new(handler));
    }

    /// Stop transfer-complete events from firing; the handler stays
    /// installed.
    pub fn disable_on_complete(&self) {
        self.registry
            .hw
            .disable_event(self.index, DmaEvent::Complete);
    }

    /// Install the transfer-error handler (replacing any previous one)
    /// and enable the matching interrupt.
    pub fn on_error<F>(&self, handler: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        self.registry
            .install(self.index, DmaEvent::Error, EventFn::new(handler));
    }

    /// Stop transfer-error events from firing; the handler stays
    /// installed.
    pub fn disable_on_error(&self) {
        self.registry.hw.disable_event(self.index, DmaEvent::Error);
    }

    /// Start the channel.
    pub fn enable(&self) {
        self.registry.hw.enable_channel(self.index);
    }

    /// Stop the channel.
    pub fn disable(&self) {
        self.registry.hw.disable_channel(self.index);
    }

    /// Whether the channel is currently started.
    pub fn is_enabled(&self) -> bool {
        self.registry.hw.channel_enabled(self.index)
    }

    /// Stop an in-flight transfer and synchronously invoke the complete
    /// handler so the owner can reclaim its buffer. A no-op when the
    /// channel is not running.
    pub fn abort(&self) {
        if !self.registry.hw.channel_enabled(self.index) {
            return;
        }
        #[cfg(feature = "defmt")]
        defmt::trace!("dma channel {=u8} aborted", self.index);
        self.registry.hw.disable_channel(self.index);
        self.registry.fire(self.index, DmaEvent::Complete);
    }
}

impl<H: DmaHardware, const CHANNELS: usize> Drop for DmaChannel<'_, H, CHANNELS> {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
