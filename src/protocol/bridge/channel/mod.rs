//! Shared state of one CAN channel.
//!
//! A [`Channel`] is allocated once (typically in a `static`) and accessed
//! from three contexts: the interrupt-side [`Poller`], the USB callback path
//! ([`CommandProcessor`] and endpoint completion) and the [`Aggregator`] task.
//! Rings carry bulk traffic between them; everything else is either an
//! atomic or lives behind a critical-section mutex held for one short
//! operation.
//!
//! [`Poller`]: crate::protocol::bridge::poller::Poller
//! [`CommandProcessor`]: crate::protocol::bridge::command::CommandProcessor
//! [`Aggregator`]: crate::protocol::bridge::aggregator::Aggregator
use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::signal::Signal;

use crate::core::{
    BusErrorEvent, BusStatus, CanFrame, Features, StatusEvent, StatusFlags, TxEvent,
};
use crate::error::CommandError;
use crate::infra::ring::SpscRing;
use crate::protocol::bridge::aggregator::EventQueues;
use crate::protocol::bridge::command::CommandProcessor;
use crate::protocol::bridge::poller::Poller;
use crate::protocol::messages::{CanInfo, CanStatus, DeviceInfo, FeatureOp, FeaturesMsg};
use crate::protocol::timestamp::{BitDurations, TimestampReconstructor};
use crate::protocol::timing::{log_bit_timing, BitTiming};
use crate::protocol::transport::endpoint::SharedEndpoint;
use crate::protocol::transport::traits::can_controller::CanController;
use crate::protocol::transport::traits::usb_pipe::UsbPipe;
use crate::protocol::transport::{
    ChannelConfig, CMD_BUFFER_SIZE, ERROR_RING_CAPACITY, MSG_BUFFER_SIZE, RX_RING_CAPACITY,
    STATUS_RING_CAPACITY, TXR_RING_CAPACITY,
};

/// Negotiated configuration, replaced as a whole on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    pub nominal: BitTiming,
    pub data: BitTiming,
    /// Active features; always a superset of the permanent ones.
    pub features: Features,
    pub reconstructor: TimestampReconstructor,
}

impl ChannelSettings {
    /// Power-on settings of a channel.
    pub fn baseline(config: &ChannelConfig) -> Self {
        Self {
            nominal: config.default_nominal,
            data: config.default_data,
            features: config.feat_perm,
            reconstructor: TimestampReconstructor::new(BitDurations::new(
                &config.default_nominal,
                &config.default_data,
                config.can_clk_hz,
            )),
        }
    }
}

pub(crate) type Shared<T> = Mutex<CriticalSectionRawMutex, T>;

/// One CAN channel with its rings and its two USB IN endpoints.
pub struct Channel<C: CanController, P: UsbPipe> {
    index: u8,
    config: ChannelConfig,
    controller: Shared<RefCell<C>>,
    settings: Shared<Cell<ChannelSettings>>,
    cmd_ep: SharedEndpoint<P, CMD_BUFFER_SIZE>,
    can_ep: SharedEndpoint<P, MSG_BUFFER_SIZE>,
    pub(crate) rx_ring: SpscRing<CanFrame, RX_RING_CAPACITY>,
    pub(crate) txr_ring: SpscRing<TxEvent, TXR_RING_CAPACITY>,
    pub(crate) status_ring: SpscRing<StatusEvent, STATUS_RING_CAPACITY>,
    pub(crate) error_ring: SpscRing<BusErrorEvent, ERROR_RING_CAPACITY>,
    mounted: AtomicBool,
    enabled: AtomicBool,
    desync: AtomicBool,
    tx_available: AtomicU8,
    tx_dropped: AtomicU16,
    irq_flags: AtomicU8,
    /// Bus status last published to the status ring.
    reported_status: AtomicU8,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

/// Bundle returned by [`Channel::split`].
pub struct ChannelParts<'a, C: CanController, P: UsbPipe> {
    /// Drives the controller FIFOs; call from the CAN interrupt.
    pub poller: Poller<'a, C, P>,
    /// Consumer ends of the rings; hand to an [`Aggregator`].
    ///
    /// [`Aggregator`]: crate::protocol::bridge::aggregator::Aggregator
    pub queues: EventQueues<'a, C, P>,
    /// Handles OUT transfers of both pipes; call from the USB callback.
    pub commands: CommandProcessor<'a, C, P>,
}

impl<C: CanController, P: UsbPipe> Channel<C, P> {
    pub fn new(index: u8, config: ChannelConfig, controller: C, cmd_pipe: P, can_pipe: P) -> Self {
        Self {
            index,
            settings: Mutex::new(Cell::new(ChannelSettings::baseline(&config))),
            config,
            controller: Mutex::new(RefCell::new(controller)),
            cmd_ep: SharedEndpoint::new(cmd_pipe),
            can_ep: SharedEndpoint::new(can_pipe),
            rx_ring: SpscRing::new(),
            txr_ring: SpscRing::new(),
            status_ring: SpscRing::new(),
            error_ring: SpscRing::new(),
            mounted: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            desync: AtomicBool::new(false),
            tx_available: AtomicU8::new(0),
            tx_dropped: AtomicU16::new(0),
            irq_flags: AtomicU8::new(0),
            reported_status: AtomicU8::new(BusStatus::ErrorActive as u8),
            wake: Signal::new(),
        }
    }

    /// Split into poller, ring consumers and command processor. Returns
    /// `None` once the channel has been split.
    pub fn split(&self) -> Option<ChannelParts<'_, C, P>> {
        let poller = Poller::new(
            self,
            self.rx_ring.producer()?,
            self.txr_ring.producer()?,
            self.status_ring.producer()?,
            self.error_ring.producer()?,
        );
        let queues = EventQueues {
            channel: self,
            rx: self.rx_ring.consumer()?,
            txr: self.txr_ring.consumer()?,
            status: self.status_ring.consumer()?,
            errors: self.error_ring.consumer()?,
        };
        Some(ChannelParts {
            poller,
            queues,
            commands: CommandProcessor::new(self),
        })
    }

    #[inline]
    pub fn index(&self) -> u8 {
        self.index
    }

    #[inline]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn settings(&self) -> ChannelSettings {
        self.settings.lock(|cell| cell.get())
    }

    fn update_settings(&self, f: impl FnOnce(&mut ChannelSettings)) {
        self.settings.lock(|cell| {
            let mut settings = cell.get();
            f(&mut settings);
            cell.set(settings);
        });
    }

    /// Run `f` with exclusive access to the controller.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        self.controller.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn cmd_endpoint(&self) -> &SharedEndpoint<P, CMD_BUFFER_SIZE> {
        &self.cmd_ep
    }

    pub fn can_endpoint(&self) -> &SharedEndpoint<P, MSG_BUFFER_SIZE> {
        &self.can_ep
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// An event could not be reported; cleared only by the next bus-on.
    pub fn is_desync(&self) -> bool {
        self.desync.load(Ordering::Acquire)
    }

    /// Transmit credits left before requests are dropped.
    pub fn tx_available(&self) -> u8 {
        self.tx_available.load(Ordering::Acquire)
    }

    /// Wake the aggregator task.
    pub fn wake(&self) {
        self.wake.signal(());
    }

    /// A wake is signalled and not yet consumed.
    pub fn wake_pending(&self) -> bool {
        self.wake.signaled()
    }

    pub(crate) async fn wait(&self) {
        self.wake.wait().await
    }

    //==================================================================================COUNTERS
    pub(crate) fn set_desync(&self) {
        if !self.desync.swap(true, Ordering::AcqRel) {
            #[cfg(feature = "defmt")]
            defmt::warn!("ch{} desync", self.index);
        }
    }

    pub(crate) fn raise_irq_flags(&self, flags: StatusFlags) {
        self.irq_flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Record `status` as published. `true` when it differs from the last
    /// published one.
    pub(crate) fn note_bus_status(&self, status: BusStatus) -> bool {
        self.reported_status.swap(status as u8, Ordering::AcqRel) != status as u8
    }

    pub(crate) fn count_tx_dropped(&self) {
        let _ = self
            .tx_dropped
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |v| v.checked_add(1));
    }

    /// Consume one transmit credit. `false` when none is left.
    pub(crate) fn take_tx_credit(&self) -> bool {
        self.tx_available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1))
            .is_ok()
    }

    /// Return a credit, never above the hardware FIFO size.
    pub(crate) fn return_tx_credit(&self) {
        let cap = self.config.tx_fifo_size;
        let _ = self
            .tx_available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v < cap).then_some(v + 1)
            });
    }

    /// Build a status snapshot, draining the lost/dropped counters and the
    /// interrupt-side flags.
    pub(crate) fn status_snapshot(&self, bus_status: BusStatus) -> CanStatus {
        let mut flags = StatusFlags::from_bits_truncate(self.irq_flags.swap(0, Ordering::AcqRel));
        if self.is_desync() {
            flags |= StatusFlags::TXR_DESYNC;
        }
        let rx_lost = self.rx_ring.take_lost();
        let tx_dropped = self.tx_dropped.swap(0, Ordering::AcqRel);
        let tx_fifo_size = self.config.tx_fifo_size;
        self.with_controller(|can| {
            let counters = can.error_counters();
            CanStatus {
                flags,
                bus_status,
                timestamp_us: can.timestamp_us(),
                rx_lost,
                tx_dropped,
                rx_errors: counters.rx_errors,
                tx_errors: counters.tx_errors,
                rx_fifo_size: can.rx_fifo_fill(),
                tx_fifo_size: tx_fifo_size.saturating_sub(can.tx_fifo_free()),
            }
        })
    }

    //==================================================================================LIFECYCLE
    pub(crate) fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::Release);
        self.wake();
    }

    /// Return to the disabled baseline: controller reset and off bus,
    /// default settings, counters and flags cleared, CAN endpoint emptied.
    /// Ring content is discarded by the aggregator on its next wake.
    pub fn reset(&self) {
        let baseline = ChannelSettings::baseline(&self.config);
        self.enabled.store(false, Ordering::Release);
        self.with_controller(|can| {
            can.reset();
            can.set_nominal_bit_timing(&baseline.nominal);
            if self.config.data_range.is_some() {
                can.set_data_bit_timing(&baseline.data);
            }
            can.set_features(baseline.features);
        });
        self.settings.lock(|cell| cell.set(baseline));
        self.desync.store(false, Ordering::Release);
        self.tx_available.store(0, Ordering::Release);
        self.tx_dropped.store(0, Ordering::Release);
        self.irq_flags.store(0, Ordering::Release);
        self.reported_status
            .store(BusStatus::ErrorActive as u8, Ordering::Release);
        let _ = self.rx_ring.take_lost();
        self.can_ep.reset();
        #[cfg(feature = "defmt")]
        defmt::info!("ch{} reset", self.index);
        self.wake();
    }

    /// Join or leave the bus. No-op when already in the requested state.
    pub fn set_bus(&self, on: bool) {
        if self.is_enabled() == on {
            return;
        }
        #[cfg(feature = "defmt")]
        defmt::info!("ch{} enabled={}", self.index, on);
        if on {
            // The aggregator restarts from error-active; a controller still
            // in a worse state must be published again.
            self.reported_status
                .store(BusStatus::ErrorActive as u8, Ordering::Release);
            self.desync.store(false, Ordering::Release);
            self.tx_available
                .store(self.config.tx_fifo_size, Ordering::Release);
            let features = self.settings().features;
            self.with_controller(|can| {
                can.set_features(features);
                can.go_bus(true);
            });
            self.enabled.store(true, Ordering::Release);
        } else {
            self.enabled.store(false, Ordering::Release);
            self.with_controller(|can| can.go_bus(false));
        }
        self.wake();
    }

    //==================================================================================CONFIGURATION
    /// Clamp and apply the arbitration-phase timing. Returns the effective
    /// timing.
    pub fn set_nominal_timing(&self, requested: &BitTiming) -> BitTiming {
        let timing = self.config.nominal_range.clamp(requested);
        log_bit_timing(&timing, self.config.can_clk_hz, "nominal");
        self.with_controller(|can| can.set_nominal_bit_timing(&timing));
        let clk = self.config.can_clk_hz;
        self.update_settings(|s| {
            s.nominal = timing;
            s.reconstructor
                .set_durations(BitDurations::new(&s.nominal, &s.data, clk));
        });
        timing
    }

    /// Clamp and apply the data-phase timing. Classic controllers have no
    /// data phase and reject the request.
    pub fn set_data_timing(&self, requested: &BitTiming) -> Result<BitTiming, CommandError> {
        let range = self.config.data_range.ok_or(CommandError::Unsupported)?;
        let timing = range.clamp(requested);
        log_bit_timing(&timing, self.config.can_clk_hz, "data");
        self.with_controller(|can| can.set_data_bit_timing(&timing));
        let clk = self.config.can_clk_hz;
        self.update_settings(|s| {
            s.data = timing;
            s.reconstructor
                .set_durations(BitDurations::new(&s.nominal, &s.data, clk));
        });
        Ok(timing)
    }

    /// Apply a FEATURES request. Takes effect at the next bus-on.
    pub fn update_features(&self, request: &FeaturesMsg) -> Result<Features, CommandError> {
        let perm = self.config.feat_perm;
        let features = match request.op {
            FeatureOp::Clear => perm,
            FeatureOp::Or => {
                let modes = request.arg & Features::MODES.bits() as u32;
                if modes.count_ones() > 1 {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("ch{} more than one mode requested {=u32:x}", self.index, modes);
                    return Err(CommandError::Param);
                }
                let supported = self.config.supported_features().bits() as u32;
                if request.arg & !supported != 0 {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("ch{} unsupported features {=u32:x}", self.index, request.arg);
                    return Err(CommandError::Unsupported);
                }
                self.settings().features | Features::from_bits_truncate(request.arg as u16)
            }
        };
        self.update_settings(|s| s.features = features);
        #[cfg(feature = "defmt")]
        defmt::info!("ch{} features {=u16:x}", self.index, features.bits());
        Ok(features)
    }

    //==================================================================================INFO
    pub fn device_info(&self) -> DeviceInfo {
        let (name, len) = self.config.channel_name(self.index);
        DeviceInfo::new(
            self.config.feat_perm,
            self.config.feat_conf,
            self.config.firmware,
            self.config.serial,
            &name[..len],
        )
    }

    pub fn can_info(&self) -> CanInfo {
        CanInfo {
            can_clk_hz: self.config.can_clk_hz,
            msg_buffer_size: MSG_BUFFER_SIZE as u16,
            nominal: self.config.nominal_range,
            data: self.config.data_range,
            tx_fifo_size: self.config.tx_fifo_size,
            rx_fifo_size: self.config.rx_fifo_size,
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
