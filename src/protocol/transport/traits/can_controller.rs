//! Register-level view of a CAN(-FD) controller as seen by the bridge.
//! Implementations wrap a HAL driver; the library never touches registers.
use crate::core::{BusErrorEvent, BusStatus, CanFrame, ErrorCounters, Features, TxEvent};
use crate::protocol::timing::BitTiming;

/// Result of draining a hardware FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Drained {
    /// Entries written to the output slice, oldest first.
    pub count: usize,
    /// Microsecond counter value captured when the batch was drained.
    pub tsc: u32,
}

/// Contract between the bridge and the CAN controller.
///
/// Called from interrupt context by the poller and from the USB callback
/// path by the command processor; the bridge serializes access.
pub trait CanController {
    type Error: core::fmt::Debug;

    /// Move up to `out.len()` received frames out of the RX FIFO.
    fn drain_rx(&mut self, out: &mut [CanFrame]) -> Drained;
    /// Move up to `out.len()` entries out of the TX-event FIFO.
    fn drain_tx_events(&mut self, out: &mut [TxEvent]) -> Drained;
    /// Queue one frame for transmission. `track_id` must come back in the
    /// matching TX event.
    fn submit_tx(&mut self, frame: &CanFrame, track_id: u8) -> Result<(), Self::Error>;

    /// Free TX FIFO slots.
    fn tx_fifo_free(&self) -> u8;
    /// Frames waiting in the RX FIFO.
    fn rx_fifo_fill(&self) -> u8;
    fn error_counters(&self) -> ErrorCounters;
    fn bus_status(&self) -> BusStatus;
    /// Pop the last protocol error latched by the controller, if any.
    fn take_bus_error(&mut self) -> Option<BusErrorEvent>;
    /// Transmitter delay compensation offset in bits.
    fn tx_delay_compensation(&self) -> u32;
    /// Current value of the free-running microsecond counter.
    fn timestamp_us(&self) -> u32;

    fn set_nominal_bit_timing(&mut self, timing: &BitTiming);
    fn set_data_bit_timing(&mut self, timing: &BitTiming);
    fn set_features(&mut self, features: Features);
    /// Join (`true`) or leave the bus.
    fn go_bus(&mut self, on: bool);
    /// Return to the power-on configuration, off bus.
    fn reset(&mut self);
}
