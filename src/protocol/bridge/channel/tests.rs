use super::*;
use crate::protocol::bridge::testing::{MockController, RecordingPipe};
use crate::core::ErrorCounters;
use crate::protocol::messages::FirmwareVersion;

fn channel(config: ChannelConfig) -> Channel<MockController, RecordingPipe> {
    Channel::new(
        0,
        config,
        MockController::default(),
        RecordingPipe::default(),
        RecordingPipe::default(),
    )
}

#[test]
/// A channel can only be split once.
fn test_split_once() {
    let ch = channel(ChannelConfig::default());
    assert!(ch.split().is_some());
    assert!(ch.split().is_none());
}

#[test]
/// Bus-on grants a full set of credits and clears desync; repeating it is a no-op.
fn test_bus_on_off_idempotent() {
    let ch = channel(ChannelConfig::default());
    ch.set_desync();
    ch.set_bus(true);
    assert!(ch.is_enabled());
    assert!(!ch.is_desync());
    assert_eq!(ch.tx_available(), 32);
    assert!(ch.with_controller(|can| can.on_bus));

    assert!(ch.take_tx_credit());
    ch.set_bus(true);
    assert_eq!(ch.tx_available(), 31);

    ch.set_desync();
    ch.set_bus(false);
    assert!(!ch.is_enabled());
    assert!(ch.is_desync());
    assert!(!ch.with_controller(|can| can.on_bus));
}

#[test]
/// Credits run out at zero and never exceed the FIFO size.
fn test_tx_credits_bounded() {
    let config = ChannelConfig {
        tx_fifo_size: 2,
        ..ChannelConfig::default()
    };
    let ch = channel(config);
    ch.set_bus(true);
    assert!(ch.take_tx_credit());
    assert!(ch.take_tx_credit());
    assert!(!ch.take_tx_credit());
    ch.return_tx_credit();
    ch.return_tx_credit();
    ch.return_tx_credit();
    assert_eq!(ch.tx_available(), 2);
}

#[test]
/// A prescaler above the advertised maximum is clamped, not rejected.
fn test_nominal_timing_clamped() {
    let ch = channel(ChannelConfig::default());
    let applied = ch.set_nominal_timing(&BitTiming::new(1000, 1, 13, 2));
    assert_eq!(applied.brp, 512);
    assert_eq!(ch.with_controller(|can| can.nominal), Some(applied));
    assert_eq!(ch.settings().nominal, applied);
    // 80 MHz / (512 * 16)
    assert_eq!(applied.bitrate(80_000_000), 9_765);
    assert_eq!(
        ch.settings().reconstructor.durations().nm_us_per_bit,
        applied.us_per_bit(80_000_000)
    );
}

#[test]
/// Data timing goes to the data setter, or is refused without a data phase.
fn test_data_timing() {
    let ch = channel(ChannelConfig::default());
    let applied = ch.set_data_timing(&BitTiming::new(1, 0, 100, 0)).unwrap();
    assert_eq!(applied, BitTiming::new(1, 1, 32, 1));
    assert_eq!(ch.with_controller(|can| can.data), Some(applied));
    assert_eq!(ch.with_controller(|can| can.nominal), None);

    let classic = channel(ChannelConfig {
        data_range: None,
        ..ChannelConfig::default()
    });
    assert_eq!(
        classic.set_data_timing(&BitTiming::new(1, 1, 10, 10)),
        Err(CommandError::Unsupported)
    );
}

#[test]
/// Two operating modes at once are refused and leave the features unchanged.
fn test_features_two_modes_rejected() {
    let ch = channel(ChannelConfig::default());
    let before = ch.settings().features;
    let request = FeaturesMsg {
        op: FeatureOp::Or,
        arg: (Features::MON_MODE | Features::EXT_LOOP_MODE).bits() as u32,
    };
    assert_eq!(ch.update_features(&request), Err(CommandError::Param));
    assert_eq!(ch.settings().features, before);
}

#[test]
/// Flags outside permanent and configurable sets are unsupported.
fn test_features_unsupported() {
    let config = ChannelConfig {
        feat_conf: Features::TXP,
        ..ChannelConfig::default()
    };
    let ch = channel(config);
    let request = FeaturesMsg {
        op: FeatureOp::Or,
        arg: Features::DAR.bits() as u32,
    };
    assert_eq!(ch.update_features(&request), Err(CommandError::Unsupported));
    let request = FeaturesMsg {
        op: FeatureOp::Or,
        arg: 0x1_0000,
    };
    assert_eq!(ch.update_features(&request), Err(CommandError::Unsupported));
}

#[test]
/// OR accumulates flags, CLEAR falls back to the permanent set.
fn test_features_or_and_clear() {
    let ch = channel(ChannelConfig::default());
    let or = |flags: Features| FeaturesMsg {
        op: FeatureOp::Or,
        arg: flags.bits() as u32,
    };
    ch.update_features(&or(Features::TXP)).unwrap();
    let features = ch.update_features(&or(Features::MON_MODE)).unwrap();
    assert_eq!(
        features,
        Features::TXR | Features::FDF | Features::TXP | Features::MON_MODE
    );

    let cleared = ch
        .update_features(&FeaturesMsg {
            op: FeatureOp::Clear,
            arg: 0,
        })
        .unwrap();
    assert_eq!(cleared, Features::TXR | Features::FDF);

    // Applied to the controller at bus-on.
    ch.update_features(&or(Features::DAR)).unwrap();
    ch.set_bus(true);
    assert_eq!(
        ch.with_controller(|can| can.features),
        Features::TXR | Features::FDF | Features::DAR
    );
}

#[test]
/// Reset returns every piece of soft state to its baseline.
fn test_reset_baseline() {
    let ch = channel(ChannelConfig::default());
    ch.set_bus(true);
    ch.set_nominal_timing(&BitTiming::new(4, 8, 40, 8));
    ch.set_desync();
    ch.count_tx_dropped();
    ch.raise_irq_flags(StatusFlags::IRQ_QUEUE_FULL);
    ch.can_endpoint().with(|ep| ep.buffer.append(&[1; 8]));

    ch.reset();
    assert!(!ch.is_enabled());
    assert!(!ch.is_desync());
    assert_eq!(ch.tx_available(), 0);
    assert_eq!(ch.settings(), ChannelSettings::baseline(ch.config()));
    assert!(ch.can_endpoint().with(|ep| !ep.buffer.has_pending()));
    ch.with_controller(|can| {
        assert_eq!(can.resets, 1);
        assert_eq!(can.nominal, Some(ChannelConfig::default().default_nominal));
    });
    let status = ch.status_snapshot(BusStatus::ErrorActive);
    assert_eq!(status.tx_dropped, 0);
    assert!(status.flags.is_empty());
}

#[test]
/// Snapshots drain counters and flags, and report desync while it lasts.
fn test_status_snapshot() {
    let ch = channel(ChannelConfig::default());
    ch.with_controller(|can| {
        can.tsc = 1234;
        can.tx_free = 30;
        can.counters = ErrorCounters {
            tx_errors: 5,
            rx_errors: 7,
        };
    });
    ch.count_tx_dropped();
    ch.count_tx_dropped();
    ch.raise_irq_flags(StatusFlags::IRQ_QUEUE_FULL);
    ch.set_desync();

    let status = ch.status_snapshot(BusStatus::ErrorWarning);
    assert_eq!(status.tx_dropped, 2);
    assert_eq!(
        status.flags,
        StatusFlags::IRQ_QUEUE_FULL | StatusFlags::TXR_DESYNC
    );
    assert_eq!(status.bus_status, BusStatus::ErrorWarning);
    assert_eq!(status.timestamp_us, 1234);
    assert_eq!(status.tx_fifo_size, 2);
    assert_eq!(status.tx_errors, 5);
    assert_eq!(status.rx_errors, 7);

    let status = ch.status_snapshot(BusStatus::ErrorWarning);
    assert_eq!(status.tx_dropped, 0);
    assert_eq!(status.flags, StatusFlags::TXR_DESYNC);
}

#[test]
/// Device info carries the feature masks and the indexed channel name.
fn test_device_and_can_info() {
    let config = ChannelConfig {
        firmware: FirmwareVersion {
            major: 1,
            minor: 2,
            patch: 3,
        },
        serial: &[0xDE, 0xAD, 0xBE, 0xEF],
        ..ChannelConfig::default()
    };
    let ch = Channel::new(
        1,
        config,
        MockController::default(),
        RecordingPipe::default(),
        RecordingPipe::default(),
    );
    let info = ch.device_info();
    assert_eq!(info.name(), b"usbcan-bridge ch1");
    assert_eq!(info.serial(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(info.feat_perm, config.feat_perm);
    assert_eq!(info.firmware.patch, 3);

    let can = ch.can_info();
    assert_eq!(can.msg_buffer_size, MSG_BUFFER_SIZE as u16);
    assert_eq!(can.nominal, config.nominal_range);
    assert_eq!(can.data, config.data_range);
}
