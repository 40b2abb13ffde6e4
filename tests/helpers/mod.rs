/// Test doubles simulating the CAN controller, the USB pipes and the timer
/// during integration tests.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration, Instant};
use usbcan_bridge::{
    core::{BusErrorEvent, BusStatus, CanFrame, ErrorCounters, Features, TxEvent},
    infra::codec::{cursor::ByteOrder, traits::ToWire},
    protocol::{
        messages::{DeviceMessage, MessageIter},
        timing::BitTiming,
        transport::traits::{
            bridge_timer::BridgeTimer,
            can_controller::{CanController, Drained},
            status_indicator::{LedStatus, StatusIndicator},
            usb_pipe::UsbPipe,
        },
    },
};

#[derive(Debug, Default)]
#[allow(dead_code)]
/// Simulated controller. Accepted frames show up in the TX-event FIFO and,
/// in external loopback mode, in the RX FIFO as well.
pub struct SimController {
    pub rx_fifo: VecDeque<CanFrame>,
    pub tx_events: VecDeque<TxEvent>,
    pub bus_errors: VecDeque<BusErrorEvent>,
    pub bus_status: BusStatus,
    pub counters: ErrorCounters,
    pub tsc: u32,
    pub nominal: Option<BitTiming>,
    pub data: Option<BitTiming>,
    pub features: Features,
    pub on_bus: bool,
}

impl CanController for SimController {
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
        if !self.on_bus {
            return Err(());
        }
        self.tx_events.push_back(TxEvent {
            track_id,
            flags: frame.flags,
            dlc: frame.dlc,
            timestamp_us: self.tsc,
        });
        if self.features.contains(Features::EXT_LOOP_MODE) {
            self.rx_fifo.push_back(*frame);
        }
        Ok(())
    }

    fn tx_fifo_free(&self) -> u8 {
        32u8.saturating_sub(self.tx_events.len() as u8)
    }

    fn rx_fifo_fill(&self) -> u8 {
        self.rx_fifo.len().min(u8::MAX as usize) as u8
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
        0
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
        self.rx_fifo.clear();
        self.tx_events.clear();
    }
}

#[allow(dead_code)]
/// IN pipe forwarding every transfer to the simulated host.
pub struct MockPipe {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[allow(dead_code)]
impl MockPipe {
    /// Build a pipe and the host end receiving its transfers.
    pub fn create() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UsbPipe for MockPipe {
    fn start_transfer(&mut self, data: &[u8]) {
        let _ = self.tx.send(data.to_vec());
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive delays in tests.
pub struct MockTimer {
    start: Instant,
}

impl Default for MockTimer {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl BridgeTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// LED whose history stays readable after the aggregator took ownership.
pub struct MockLed {
    pub history: Arc<Mutex<Vec<LedStatus>>>,
}

impl StatusIndicator for MockLed {
    fn set_status(&mut self, status: LedStatus) {
        if let Ok(mut history) = self.history.lock() {
            history.push(status);
        }
    }
}

#[allow(dead_code)]
/// Concatenate host messages into one OUT transfer.
pub fn encode(messages: &[&dyn ToWire]) -> Vec<u8> {
    let mut out = Vec::new();
    for message in messages {
        let mut tmp = [0u8; 128];
        let len = message
            .to_wire(ByteOrder::Little, &mut tmp)
            .expect("message must fit");
        out.extend_from_slice(&tmp[..len]);
    }
    out
}

#[allow(dead_code)]
/// Decode every message of a device-to-host transfer.
pub fn decode(bytes: &[u8]) -> Vec<DeviceMessage> {
    MessageIter::new(bytes)
        .map(|raw| {
            DeviceMessage::decode(&raw.expect("well-formed header"), ByteOrder::Little)
                .expect("known message")
        })
        .collect()
}

#[allow(dead_code)]
/// Wait for the next transfer of a pipe, failing the test after one second.
pub async fn next_transfer(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("transfer expected")
        .expect("pipe closed")
}
