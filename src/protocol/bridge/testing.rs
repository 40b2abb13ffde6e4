//! Host doubles shared by the bridge unit tests.
use std::collections::VecDeque;

use crate::core::{BusErrorEvent, BusStatus, CanFrame, ErrorCounters, Features, TxEvent};
use crate::infra::codec::cursor::ByteOrder;
use crate::protocol::messages::{DeviceMessage, MessageIter};
use crate::protocol::timing::BitTiming;
use crate::protocol::transport::traits::bridge_timer::BridgeTimer;
use crate::protocol::transport::traits::can_controller::{CanController, Drained};
use crate::protocol::transport::traits::status_indicator::{LedStatus, StatusIndicator};
use crate::protocol::transport::traits::usb_pipe::UsbPipe;

/// Scripted controller: tests fill the FIFOs and inspect what was applied.
#[derive(Debug, Default)]
pub struct MockController {
    pub rx_fifo: VecDeque<CanFrame>,
    pub tx_events: VecDeque<TxEvent>,
    pub bus_errors: VecDeque<BusErrorEvent>,
    pub submitted: Vec<(CanFrame, u8)>,
    pub bus_status: BusStatus,
    pub counters: ErrorCounters,
    pub tsc: u32,
    pub tdc: u32,
    pub tx_free: u8,
    pub refuse_tx: bool,
    pub nominal: Option<BitTiming>,
    pub data: Option<BitTiming>,
    pub features: Features,
    pub on_bus: bool,
    pub resets: usize,
}

impl CanController for MockController {
    type Error = ();

    fn drain_rx(&mut self, out: &mut [CanFrame]) -> Drained {
        let count = out.len().min(self.rx_fifo.len());
        for (slot, frame) in out.iter_mut().zip(self.rx_fifo.drain(..count)) {
            *slot = frame;
        }
        Drained {
            count,
            tsc: self.tsc,
        }
    }

    fn drain_tx_events(&mut self, out: &mut [TxEvent]) -> Drained {
        let count = out.len().min(self.tx_events.len());
        for (slot, event) in out.iter_mut().zip(self.tx_events.drain(..count)) {
            *slot = event;
        }
        Drained {
            count,
            tsc: self.tsc,
        }
    }

    fn submit_tx(&mut self, frame: &CanFrame, track_id: u8) -> Result<(), ()> {
        if self.refuse_tx {
            return Err(());
        }
        self.submitted.push((*frame, track_id));
        Ok(())
    }

    fn tx_fifo_free(&self) -> u8 {
        self.tx_free
    }

    fn rx_fifo_fill(&self) -> u8 {
        self.rx_fifo.len() as u8
    }

    fn error_counters(&self) -> ErrorCounters {
        self.counters
    }

    fn bus_status(&self) -> BusStatus {
        self.bus_status
    }

    fn take_bus_error(&mut self) -> Option<BusErrorEvent> {
        self.bus_errors.pop_front()
    }

    fn tx_delay_compensation(&self) -> u32 {
        self.tdc
    }

    fn timestamp_us(&self) -> u32 {
        self.tsc
    }

    fn set_nominal_bit_timing(&mut self, timing: &BitTiming) {
        self.nominal = Some(*timing);
    }

    fn set_data_bit_timing(&mut self, timing: &BitTiming) {
        self.data = Some(*timing);
    }

    fn set_features(&mut self, features: Features) {
        self.features = features;
    }

    fn go_bus(&mut self, on: bool) {
        self.on_bus = on;
    }

    fn reset(&mut self) {
        self.on_bus = false;
        self.resets += 1;
    }
}

/// Pipe keeping a copy of every transfer.
#[derive(Debug, Default)]
pub struct RecordingPipe {
    pub transfers: Vec<Vec<u8>>,
}

impl UsbPipe for RecordingPipe {
    fn start_transfer(&mut self, data: &[u8]) {
        self.transfers.push(data.to_vec());
    }
}

/// Clock advanced by hand; delays complete immediately.
#[derive(Debug, Default)]
pub struct ManualTimer {
    pub now: u64,
    pub delays: Vec<u32>,
}

impl BridgeTimer for ManualTimer {
    async fn delay_ms(&mut self, millis: u32) {
        self.delays.push(millis);
    }

    fn now_ms(&self) -> u64 {
        self.now
    }
}

/// LEDs remembering every state and traffic burst.
#[derive(Debug, Default)]
pub struct RecordingLed {
    pub history: Vec<LedStatus>,
    pub bursts: Vec<u32>,
}

impl StatusIndicator for RecordingLed {
    fn set_status(&mut self, status: LedStatus) {
        self.history.push(status);
    }

    fn traffic_burst(&mut self, duration_ms: u32) {
        self.bursts.push(duration_ms);
    }
}

/// Decode every message of a device-to-host transfer.
pub fn decode_all(bytes: &[u8]) -> Vec<DeviceMessage> {
    MessageIter::new(bytes)
        .map(|raw| DeviceMessage::decode(&raw.unwrap(), ByteOrder::Little).unwrap())
        .collect()
}
