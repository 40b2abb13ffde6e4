//! Host-side walkthrough of one bridge channel in external loopback.
//!
//! A simulated controller stands in for the CAN peripheral and tokio
//! channels stand in for the USB IN pipes. The host greets the device,
//! enables loopback, goes bus-on and sends a few frames; each one comes
//! back as a transmit result and as a received frame.
//!
//! ```text
//! cargo run --example loopback
//! ```

#[path = "../../tests/helpers/mod.rs"]
mod helpers;

use embedded_can::{Frame, StandardId};
use helpers::{decode, encode, next_transfer, MockLed, MockPipe, MockTimer, SimController};
use static_cell::StaticCell;
use usbcan_bridge::{
    core::{CanFrame, Features},
    protocol::{
        bridge::{
            aggregator::Aggregator, can_endpoint, channel::Channel, cmd_endpoint, Bridge,
            EP_DIR_IN,
        },
        messages::{BusMsg, CanTx, DeviceMessage, FeatureOp, FeaturesMsg, HelloDevice},
        transport::ChannelConfig,
    },
};

static CHANNEL: StaticCell<Channel<SimController, MockPipe>> = StaticCell::new();

const FRAMES: u8 = 4;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let (cmd_pipe, mut cmd_rx) = MockPipe::create();
    let (can_pipe, mut can_rx) = MockPipe::create();
    let channel: &'static Channel<_, _> = CHANNEL.init(Channel::new(
        0,
        ChannelConfig::default(),
        SimController::default(),
        cmd_pipe,
        can_pipe,
    ));
    let Some(parts) = channel.split() else {
        return;
    };
    let mut poller = parts.poller;
    let aggregator = Aggregator::new(parts.queues, MockTimer::default(), MockLed::default());
    let mut bridge = Bridge::new([parts.commands]);

    let runner = aggregator.run();
    tokio::pin!(runner);

    tokio::select! {
        _ = &mut runner => {}
        _ = async {
            bridge.mount();

            let loopback = FeaturesMsg {
                op: FeatureOp::Or,
                arg: Features::EXT_LOOP_MODE.bits() as u32,
            };
            for request in [
                encode(&[&HelloDevice]),
                encode(&[&loopback, &BusMsg { on: true }]),
            ] {
                bridge.on_out(cmd_endpoint(0), &request);
                for reply in decode(&next_transfer(&mut cmd_rx).await) {
                    println!("cmd  <- {:?}", reply);
                }
                bridge.on_in_complete(EP_DIR_IN | cmd_endpoint(0));
            }

            for track_id in 0..FRAMES {
                let id = StandardId::new(0x100 + track_id as u16).unwrap_or(StandardId::ZERO);
                let Some(frame) = CanFrame::new(id, &[track_id; 4]) else {
                    continue;
                };
                println!("can  -> CAN_TX track {} id {:#x}", track_id, frame.id);
                bridge.on_out(can_endpoint(0), &encode(&[&CanTx { frame, track_id }]));
            }
            // CAN interrupt.
            poller.poll();

            let mut results = 0;
            while results < FRAMES {
                for msg in decode(&next_transfer(&mut can_rx).await) {
                    match msg {
                        DeviceMessage::CanTxr(txr) => {
                            results += 1;
                            println!(
                                "can  <- TXR track {} at {} us",
                                txr.track_id, txr.timestamp_us
                            );
                        }
                        DeviceMessage::CanRx(rx) => {
                            println!("can  <- RX id {:#x} {:?}", rx.0.id, rx.0.payload());
                        }
                        other => println!("can  <- {:?}", other),
                    }
                }
                bridge.on_in_complete(EP_DIR_IN | can_endpoint(0));
            }

            bridge.unmount();
        } => {}
    }
}
