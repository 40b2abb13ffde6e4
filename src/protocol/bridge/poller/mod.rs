//! Interrupt-side half of a channel: drains the controller FIFOs, stamps
//! the batches and publishes them into the rings.
//!
//! Never blocks and never waits for the aggregator. A full ring drops the
//! newest entries and counts them.
use crate::core::{BusErrorEvent, CanFrame, StatusEvent, StatusFlags, TxEvent};
use crate::infra::ring::Producer;
use crate::protocol::bridge::channel::Channel;
use crate::protocol::transport::traits::can_controller::CanController;
use crate::protocol::transport::traits::usb_pipe::UsbPipe;
use crate::protocol::transport::{
    ERROR_RING_CAPACITY, RX_RING_CAPACITY, STATUS_RING_CAPACITY, TXR_RING_CAPACITY,
};

/// Producer ends of a channel's rings plus drain scratch space.
pub struct Poller<'a, C: CanController, P: UsbPipe> {
    channel: &'a Channel<C, P>,
    rx: Producer<'a, CanFrame, RX_RING_CAPACITY>,
    txr: Producer<'a, TxEvent, TXR_RING_CAPACITY>,
    status: Producer<'a, StatusEvent, STATUS_RING_CAPACITY>,
    errors: Producer<'a, BusErrorEvent, ERROR_RING_CAPACITY>,
    rx_scratch: [CanFrame; RX_RING_CAPACITY],
    tx_scratch: [TxEvent; TXR_RING_CAPACITY],
}

impl<'a, C: CanController, P: UsbPipe> Poller<'a, C, P> {
    pub(crate) fn new(
        channel: &'a Channel<C, P>,
        rx: Producer<'a, CanFrame, RX_RING_CAPACITY>,
        txr: Producer<'a, TxEvent, TXR_RING_CAPACITY>,
        status: Producer<'a, StatusEvent, STATUS_RING_CAPACITY>,
        errors: Producer<'a, BusErrorEvent, ERROR_RING_CAPACITY>,
    ) -> Self {
        Self {
            channel,
            rx,
            txr,
            status,
            errors,
            rx_scratch: [CanFrame::empty(); RX_RING_CAPACITY],
            tx_scratch: [TxEvent::default(); TXR_RING_CAPACITY],
        }
    }

    pub fn channel(&self) -> &'a Channel<C, P> {
        self.channel
    }

    /// One interrupt's worth of work. Wakes the aggregator if anything was
    /// published.
    pub fn poll(&mut self) {
        let channel = self.channel;
        let reconstructor = channel.settings().reconstructor;
        let mut produced = false;
        let mut queue_full = false;
        let mut txr_overflow = false;

        channel.with_controller(|can| {
            let status = can.bus_status();
            if channel.note_bus_status(status) {
                let event = StatusEvent {
                    status,
                    timestamp_us: can.timestamp_us(),
                };
                queue_full |= self.status.push(event).is_err();
                produced = true;
            }

            while let Some(error) = can.take_bus_error() {
                queue_full |= self.errors.push(error).is_err();
                produced = true;
            }

            loop {
                let drained = can.drain_rx(&mut self.rx_scratch);
                if drained.count == 0 {
                    break;
                }
                let frames = &mut self.rx_scratch[..drained.count];
                reconstructor.stamp_rx(frames, drained.tsc);
                let mut batch = self.rx.batch();
                for frame in frames.iter() {
                    // Rejected frames are counted as lost by the ring.
                    let _ = batch.push(*frame);
                }
                produced = true;
                if drained.count < RX_RING_CAPACITY {
                    break;
                }
            }

            let tdc = can.tx_delay_compensation();
            loop {
                let drained = can.drain_tx_events(&mut self.tx_scratch);
                if drained.count == 0 {
                    break;
                }
                let events = &mut self.tx_scratch[..drained.count];
                reconstructor.stamp_tx(events, drained.tsc, tdc);
                let mut batch = self.txr.batch();
                for event in events.iter() {
                    txr_overflow |= batch.push(*event).is_err();
                }
                produced = true;
                if drained.count < TXR_RING_CAPACITY {
                    break;
                }
            }
        });

        if queue_full {
            channel.raise_irq_flags(StatusFlags::IRQ_QUEUE_FULL);
            channel.set_desync();
        }
        if txr_overflow {
            channel.set_desync();
        }
        if produced {
            channel.wake();
        }
    }
}
