//! Bus event aggregator: the per-channel task that turns ring content into
//! CAN-pipe messages.
//!
//! ## Drain order
//!
//! Every wake runs passes until one makes no progress. A pass handles at
//! most one item of each source, in this order:
//!
//! 1. pending status snapshot (always once per wake)
//! 2. status ring (bus status transitions, re-arms the snapshot)
//! 3. error ring
//! 4. RX ring
//! 5. TXR ring (returns one transmit credit)
//!
//! Under sustained load every source therefore advances by one message per
//! pass. When the active bank is full and the other bank is still in flight
//! the item stays in its ring, the task re-arms its own wake and backs off
//! for [`USB_BACKOFF_MS`].
use crate::core::{BusErrorEvent, BusStatus, CanFrame, StatusEvent, TxEvent};
use crate::infra::codec::traits::WireMessage;
use crate::infra::ring::Consumer;
use crate::protocol::bridge::channel::Channel;
use crate::protocol::messages::{CanError, CanRx, CanStatus, CanTxr};
use crate::protocol::transport::traits::bridge_timer::BridgeTimer;
use crate::protocol::transport::traits::can_controller::CanController;
use crate::protocol::transport::traits::status_indicator::{LedStatus, StatusIndicator};
use crate::protocol::transport::traits::usb_pipe::UsbPipe;
use crate::protocol::transport::{
    BUS_ACTIVITY_TIMEOUT_MS, ERROR_RING_CAPACITY, LED_BURST_DURATION_MS, RX_RING_CAPACITY,
    STATUS_RING_CAPACITY, TXR_RING_CAPACITY, USB_BACKOFF_MS,
};

/// Consumer ends of a channel's rings.
pub struct EventQueues<'a, C: CanController, P: UsbPipe> {
    pub(crate) channel: &'a Channel<C, P>,
    pub(crate) rx: Consumer<'a, CanFrame, RX_RING_CAPACITY>,
    pub(crate) txr: Consumer<'a, TxEvent, TXR_RING_CAPACITY>,
    pub(crate) status: Consumer<'a, StatusEvent, STATUS_RING_CAPACITY>,
    pub(crate) errors: Consumer<'a, BusErrorEvent, ERROR_RING_CAPACITY>,
}

impl<C: CanController, P: UsbPipe> EventQueues<'_, C, P> {
    fn clear(&mut self) {
        self.rx.clear();
        self.txr.clear();
        self.status.clear();
        self.errors.clear();
    }
}

/// Soft state derived from the event stream, reset whenever the channel is
/// disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct LocalState {
    current_bus_status: BusStatus,
    last_activity_ms: Option<u64>,
    has_bus_error: bool,
    send_status: bool,
    led: LedStatus,
}

/// Outcome of one wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeOutcome {
    /// USB detached; local state reset.
    Unmounted,
    /// Channel off; local state reset.
    Disabled,
    /// Every ring drained.
    Drained,
    /// Both banks busy; items left queued and the wake re-armed.
    Backoff,
}

/// Runs the drain loop of one channel.
pub struct Aggregator<'a, C, P, T, L>
where
    C: CanController,
    P: UsbPipe,
    T: BridgeTimer,
    L: StatusIndicator,
{
    queues: EventQueues<'a, C, P>,
    timer: T,
    led: L,
    state: LocalState,
}

impl<'a, C, P, T, L> Aggregator<'a, C, P, T, L>
where
    C: CanController,
    P: UsbPipe,
    T: BridgeTimer,
    L: StatusIndicator,
{
    pub fn new(queues: EventQueues<'a, C, P>, timer: T, led: L) -> Self {
        Self {
            queues,
            timer,
            led,
            state: LocalState::default(),
        }
    }

    pub fn channel(&self) -> &'a Channel<C, P> {
        self.queues.channel
    }

    pub fn led(&self) -> &L {
        &self.led
    }

    /// Task body. Never returns.
    pub async fn run(mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("ch{} task start", self.channel().index());
        loop {
            self.channel().wait().await;
            self.process_wake().await;
        }
    }

    /// Handle one wake notification.
    pub async fn process_wake(&mut self) -> WakeOutcome {
        let channel = self.channel();
        if !channel.is_mounted() {
            self.reset_state();
            return WakeOutcome::Unmounted;
        }
        if !channel.is_enabled() {
            self.reset_state();
            return WakeOutcome::Disabled;
        }

        self.led.traffic_burst(LED_BURST_DURATION_MS);
        let now = self.timer.now_ms();
        self.state.send_status = true;
        let blocked = self.drain(now);
        channel.can_endpoint().with(|ep| ep.flush());
        self.update_led(now);

        if blocked {
            channel.wake();
            self.timer.delay_ms(USB_BACKOFF_MS).await;
            WakeOutcome::Backoff
        } else {
            WakeOutcome::Drained
        }
    }

    fn reset_state(&mut self) {
        self.queues.clear();
        if self.state.led != LedStatus::Disabled {
            self.led.set_status(LedStatus::Disabled);
        }
        self.state = LocalState::default();
        #[cfg(feature = "defmt")]
        defmt::debug!("ch{} usb state reset", self.channel().index());
    }

    /// Serialize `build()` into the active bank, submitting a full bank
    /// first if the pipe can take it. `false` means both banks are busy.
    fn place<M: WireMessage>(&self, len: usize, build: impl FnOnce() -> M) -> bool {
        let channel = self.channel();
        let order = channel.config().byte_order;
        channel.can_endpoint().with(|ep| {
            if ep.buffer.remaining() < len {
                if !ep.buffer.is_send_ready() {
                    return false;
                }
                let _ = ep.submit();
            }
            ep.buffer.append_message(&build(), order)
        })
    }

    /// Returns `true` when it stopped on a busy pipe.
    fn drain(&mut self, now: u64) -> bool {
        let channel = self.channel();
        loop {
            let mut progress = false;

            if self.state.send_status {
                let bus_status = self.state.current_bus_status;
                let len = CanStatus::default().wire_len();
                if !self.place(len, || channel.status_snapshot(bus_status)) {
                    return true;
                }
                self.state.send_status = false;
                progress = true;
            }

            if let Some(event) = self.queues.status.pop() {
                #[cfg(feature = "defmt")]
                defmt::info!("ch{} bus status {}", channel.index(), event.status);
                self.state.current_bus_status = event.status;
                self.state.send_status = true;
                self.state.last_activity_ms = Some(now);
                progress = true;
            }

            if let Some(event) = self.queues.errors.peek() {
                self.state.has_bus_error = true;
                self.state.last_activity_ms = Some(now);
                let msg = CanError(event);
                if !self.place(msg.wire_len(), || msg) {
                    return true;
                }
                self.queues.errors.consume();
                progress = true;
            }

            if let Some(frame) = self.queues.rx.peek() {
                self.state.has_bus_error = false;
                self.state.last_activity_ms = Some(now);
                let msg = CanRx(frame);
                if !self.place(msg.wire_len(), || msg) {
                    return true;
                }
                self.queues.rx.consume();
                progress = true;
            }

            if let Some(event) = self.queues.txr.peek() {
                self.state.has_bus_error = false;
                self.state.last_activity_ms = Some(now);
                let msg = CanTxr {
                    track_id: event.track_id,
                    flags: event.flags,
                    timestamp_us: event.timestamp_us,
                };
                if !self.place(msg.wire_len(), || msg) {
                    return true;
                }
                self.queues.txr.consume();
                channel.return_tx_credit();
                progress = true;
            }

            if !progress {
                return false;
            }
        }
    }

    fn update_led(&mut self, now: u64) {
        let active = self
            .state
            .last_activity_ms
            .is_some_and(|t| now.saturating_sub(t) < BUS_ACTIVITY_TIMEOUT_MS);
        let error =
            self.state.has_bus_error || self.state.current_bus_status.is_passive_or_worse();
        let led = match (error, active) {
            (true, true) => LedStatus::ErrorActive,
            (true, false) => LedStatus::ErrorIdle,
            (false, true) => LedStatus::BusOnActive,
            (false, false) => LedStatus::BusOnIdle,
        };
        if led != self.state.led {
            self.led.set_status(led);
            self.state.led = led;
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
