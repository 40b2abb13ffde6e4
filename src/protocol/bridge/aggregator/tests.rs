use super::*;
use crate::core::{CanErrorCode, FrameFlags, StatusFlags};
use crate::protocol::bridge::channel::ChannelParts;
use crate::protocol::bridge::poller::Poller;
use crate::protocol::bridge::testing::{
    decode_all, ManualTimer, MockController, RecordingLed, RecordingPipe,
};
use crate::protocol::messages::DeviceMessage;
use crate::protocol::transport::{ChannelConfig, MSG_BUFFER_SIZE};
use embedded_can::{Frame, StandardId};
use futures_util::FutureExt;

type TestChannel = Channel<MockController, RecordingPipe>;
type TestAggregator<'a> = Aggregator<'a, MockController, RecordingPipe, ManualTimer, RecordingLed>;

fn channel() -> TestChannel {
    Channel::new(
        0,
        ChannelConfig::default(),
        MockController::default(),
        RecordingPipe::default(),
        RecordingPipe::default(),
    )
}

fn start(ch: &TestChannel) -> (Poller<'_, MockController, RecordingPipe>, TestAggregator<'_>) {
    let ChannelParts { poller, queues, .. } = ch.split().unwrap();
    ch.set_mounted(true);
    ch.set_bus(true);
    let aggregator = Aggregator::new(queues, ManualTimer::default(), RecordingLed::default());
    (poller, aggregator)
}

fn wake(aggregator: &mut TestAggregator<'_>) -> WakeOutcome {
    aggregator.process_wake().now_or_never().unwrap()
}

fn sent(ch: &TestChannel) -> Vec<DeviceMessage> {
    ch.can_endpoint().with(|ep| {
        let mut all = Vec::new();
        for transfer in &ep.pipe.transfers {
            all.extend(decode_all(transfer));
        }
        all
    })
}

fn frame(id: u16, len: usize) -> CanFrame {
    CanFrame::new(StandardId::new(id).unwrap(), &[0x55; 8][..len]).unwrap()
}

#[test]
/// A wake emits a status snapshot first, then the queued events in source order.
fn test_drain_order() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    ch.with_controller(|can| {
        can.rx_fifo.push_back(frame(0x123, 4));
        can.tx_events.push_back(TxEvent {
            track_id: 9,
            flags: FrameFlags::EXT,
            dlc: 0,
            timestamp_us: 0,
        });
        can.bus_errors.push_back(BusErrorEvent {
            code: CanErrorCode::Form,
            ..BusErrorEvent::default()
        });
    });
    poller.poll();
    assert!(ch.take_tx_credit());

    assert_eq!(wake(&mut aggregator), WakeOutcome::Drained);

    let messages = sent(&ch);
    assert_eq!(messages.len(), 4);
    assert!(matches!(messages[0], DeviceMessage::CanStatus(_)));
    assert!(matches!(messages[1], DeviceMessage::CanError(CanError(e)) if e.code == CanErrorCode::Form));
    assert!(matches!(messages[2], DeviceMessage::CanRx(CanRx(f)) if f.id == 0x123 && f.len() == 4));
    assert!(
        matches!(messages[3], DeviceMessage::CanTxr(t) if t.track_id == 9 && t.flags == FrameFlags::EXT)
    );
    // TXR returned the credit.
    assert_eq!(ch.tx_available(), 32);
}

#[test]
/// A bus status transition re-arms the snapshot with the new status.
fn test_status_transition_reemits() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    ch.with_controller(|can| can.bus_status = BusStatus::ErrorPassive);
    poller.poll();

    wake(&mut aggregator);

    let statuses: Vec<BusStatus> = sent(&ch)
        .into_iter()
        .filter_map(|m| match m {
            DeviceMessage::CanStatus(s) => Some(s.bus_status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![BusStatus::ErrorActive, BusStatus::ErrorPassive]);
    assert_eq!(aggregator.led().history.last(), Some(&LedStatus::ErrorActive));
}

#[test]
/// With both banks busy the items stay queued and the task backs off.
fn test_backoff_keeps_items() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    // Occupy both banks.
    ch.can_endpoint().with(|ep| {
        ep.buffer.append(&[0; 8]);
        ep.submit().unwrap();
        ep.buffer.append(&[0; MSG_BUFFER_SIZE - 8]);
    });
    ch.with_controller(|can| can.rx_fifo.push_back(frame(1, 8)));
    poller.poll();

    assert_eq!(wake(&mut aggregator), WakeOutcome::Backoff);
    assert_eq!(ch.rx_ring.used(), 1);
    assert!(ch.wake_pending());
    assert_eq!(aggregator.timer.delays, vec![USB_BACKOFF_MS]);

    // Host drains the in-flight bank; completion submits the full one.
    ch.can_endpoint().on_transfer_complete();
    ch.can_endpoint().on_transfer_complete();
    assert_eq!(wake(&mut aggregator), WakeOutcome::Drained);
    assert_eq!(ch.rx_ring.used(), 0);
}

#[test]
/// A full active bank is submitted and the item retried in the other bank.
fn test_full_bank_submitted() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    ch.with_controller(|can| {
        for i in 0..32 {
            let frame = CanFrame::new_fd(StandardId::new(i).unwrap(), &[i as u8; 64], true).unwrap();
            can.rx_fifo.push_back(frame);
        }
    });
    poller.poll();

    assert_eq!(wake(&mut aggregator), WakeOutcome::Backoff);
    let transfers = ch.can_endpoint().with(|ep| ep.pipe.transfers.len());
    assert_eq!(transfers, 1);

    // Keep completing transfers until every frame went out.
    for _ in 0..16 {
        ch.can_endpoint().on_transfer_complete();
        wake(&mut aggregator);
    }
    ch.can_endpoint().on_transfer_complete();
    let rx: Vec<u32> = sent(&ch)
        .into_iter()
        .filter_map(|m| match m {
            DeviceMessage::CanRx(CanRx(f)) => Some(f.id),
            _ => None,
        })
        .collect();
    assert_eq!(rx, (0..32).collect::<Vec<u32>>());
}

#[test]
/// Disabling the channel discards queued events and turns the LED off.
fn test_disabled_resets_state() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    ch.with_controller(|can| can.rx_fifo.push_back(frame(2, 1)));
    poller.poll();
    wake(&mut aggregator);
    assert_eq!(aggregator.led().history.last(), Some(&LedStatus::BusOnActive));

    ch.with_controller(|can| can.rx_fifo.push_back(frame(3, 1)));
    poller.poll();
    ch.set_bus(false);
    assert_eq!(wake(&mut aggregator), WakeOutcome::Disabled);
    assert_eq!(ch.rx_ring.used(), 0);
    assert_eq!(aggregator.led().history.last(), Some(&LedStatus::Disabled));
}

#[test]
/// Activity fades to idle after the activity window.
fn test_led_idle_after_timeout() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    ch.with_controller(|can| can.rx_fifo.push_back(frame(2, 1)));
    poller.poll();
    wake(&mut aggregator);
    assert_eq!(aggregator.led().history.last(), Some(&LedStatus::BusOnActive));

    aggregator.timer.now += BUS_ACTIVITY_TIMEOUT_MS;
    wake(&mut aggregator);
    assert_eq!(aggregator.led().history.last(), Some(&LedStatus::BusOnIdle));
}

#[test]
/// Snapshot reports desync raised by the interrupt side.
fn test_snapshot_reports_desync() {
    let ch = channel();
    let (_poller, mut aggregator) = start(&ch);
    ch.set_desync();
    wake(&mut aggregator);
    let flags = sent(&ch).into_iter().find_map(|m| match m {
        DeviceMessage::CanStatus(s) => Some(s.flags),
        _ => None,
    });
    assert_eq!(flags, Some(StatusFlags::TXR_DESYNC));
}

#[test]
/// Nothing happens while the USB side is detached.
fn test_unmounted() {
    let ch = channel();
    let (_poller, mut aggregator) = start(&ch);
    ch.set_mounted(false);
    assert_eq!(wake(&mut aggregator), WakeOutcome::Unmounted);
    assert!(sent(&ch).is_empty());
}

#[test]
/// A controller still error-passive after a bus off/on cycle is reported again.
fn test_bus_status_survives_reenable() {
    let ch = channel();
    let (mut poller, mut aggregator) = start(&ch);
    ch.with_controller(|can| can.bus_status = BusStatus::ErrorPassive);
    poller.poll();
    wake(&mut aggregator);

    ch.set_bus(false);
    assert_eq!(wake(&mut aggregator), WakeOutcome::Disabled);
    ch.set_bus(true);
    poller.poll();
    ch.can_endpoint().on_transfer_complete();
    ch.can_endpoint().on_transfer_complete();
    wake(&mut aggregator);

    let last = sent(&ch).into_iter().rev().find_map(|m| match m {
        DeviceMessage::CanStatus(s) => Some(s.bus_status),
        _ => None,
    });
    assert_eq!(last, Some(BusStatus::ErrorPassive));
    assert_eq!(aggregator.led().history.last(), Some(&LedStatus::ErrorActive));
}

#[test]
/// Every enabled wake flashes the traffic LED; disabled wakes do not.
fn test_traffic_burst_per_wake() {
    let ch = channel();
    let (_poller, mut aggregator) = start(&ch);
    wake(&mut aggregator);
    wake(&mut aggregator);
    assert_eq!(aggregator.led().bursts, vec![LED_BURST_DURATION_MS; 2]);

    ch.set_bus(false);
    wake(&mut aggregator);
    assert_eq!(aggregator.led().bursts.len(), 2);
}
