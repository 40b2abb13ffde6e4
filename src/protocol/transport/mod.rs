//! USB transport layer: double-buffered bulk endpoints, collaborator traits
//! (CAN controller, USB pipe, timer, status LED) and per-channel
//! configuration.
//!
//! ## Bridge constants
//!
//! These constants size the static buffers of a channel and bound how the
//! aggregator backs off when the host does not drain the IN pipe.

pub mod endpoint;
pub mod traits;

use crate::core::Features;
use crate::infra::codec::cursor::ByteOrder;
use crate::protocol::messages::{FirmwareVersion, NAME_MAX_LEN};
use crate::protocol::timing::{BitTiming, BitTimingRange};

/// Protocol version announced in the handshake reply.
pub const PROTOCOL_VERSION: u8 = 2;

/// Bank size of the CAN-data pipe (bytes).
///
/// Larger than [`USB_MAX_PACKET_SIZE`], so a transfer whose length is an
/// exact multiple of the packet size would need a zero-length packet to
/// terminate it. The endpoint appends a 4-byte zero sentinel instead.
pub const MSG_BUFFER_SIZE: usize = 512;

/// Bank size of the command pipe (bytes). Equal to one full-speed packet.
pub const CMD_BUFFER_SIZE: usize = 64;

/// Max packet size of the full-speed bulk endpoints.
pub const USB_MAX_PACKET_SIZE: usize = 64;

/// Ring capacities. Powers of two.
pub const RX_RING_CAPACITY: usize = 32;
pub const TXR_RING_CAPACITY: usize = 32;
pub const STATUS_RING_CAPACITY: usize = 16;
pub const ERROR_RING_CAPACITY: usize = 16;

/// Window after the last bus event during which the bus counts as active (ms).
///
/// Drives the activity half of the status LED: a channel that saw no
/// frame, acknowledgement or error for this long is shown as idle.
pub const BUS_ACTIVITY_TIMEOUT_MS: u64 = 256;

/// Traffic LED burst length on each aggregator wake (ms).
pub const LED_BURST_DURATION_MS: u32 = 8;

/// Delay the aggregator yields when both banks of the IN pipe are busy (ms).
///
/// # Recommended Values
///
/// - **1 ms**: one full-speed frame; the host polls at least once per frame.
/// - Longer delays only add latency once the host is saturated.
pub const USB_BACKOFF_MS: u32 = 1;

//==================================================================================CHANNEL_CONFIG
/// Static description of one CAN channel, fixed at board level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Controller kernel clock.
    pub can_clk_hz: u32,
    pub nominal_range: BitTimingRange,
    /// `None` for classic CAN controllers.
    pub data_range: Option<BitTimingRange>,
    /// Timing applied at reset, before the host negotiates its own.
    pub default_nominal: BitTiming,
    pub default_data: BitTiming,
    /// Always enabled.
    pub feat_perm: Features,
    /// May be enabled by the host.
    pub feat_conf: Features,
    pub tx_fifo_size: u8,
    pub rx_fifo_size: u8,
    pub firmware: FirmwareVersion,
    /// Device name; the channel index is appended in device-info replies.
    pub name: &'static str,
    pub serial: &'static [u8],
    /// Byte order of multi-byte wire fields, announced in the handshake.
    pub byte_order: ByteOrder,
}

impl Default for ChannelConfig {
    /// M_CAN class FD controller clocked at 80 MHz, 500 kbit/s nominal and
    /// 2 Mbit/s data rate.
    fn default() -> Self {
        Self {
            can_clk_hz: 80_000_000,
            nominal_range: BitTimingRange::new(
                BitTiming::new(1, 1, 2, 2),
                BitTiming::new(512, 128, 256, 128),
            ),
            data_range: Some(BitTimingRange::new(
                BitTiming::new(1, 1, 1, 1),
                BitTiming::new(32, 16, 32, 16),
            )),
            default_nominal: BitTiming::new(1, 32, 127, 32),
            default_data: BitTiming::new(1, 10, 29, 10),
            feat_perm: Features::TXR | Features::FDF,
            feat_conf: Features::TXP
                | Features::EHD
                | Features::DAR
                | Features::MON_MODE
                | Features::RES_MODE
                | Features::EXT_LOOP_MODE,
            tx_fifo_size: 32,
            rx_fifo_size: 32,
            firmware: FirmwareVersion {
                major: 0,
                minor: 1,
                patch: 0,
            },
            name: "usbcan-bridge",
            serial: &[0, 0, 0, 0],
            byte_order: ByteOrder::Little,
        }
    }
}

impl ChannelConfig {
    /// Device name followed by ` ch<index>`, truncated to the wire capacity.
    /// Returns the buffer and the used length.
    pub fn channel_name(&self, index: u8) -> ([u8; NAME_MAX_LEN], usize) {
        let mut buf = [0u8; NAME_MAX_LEN];
        let suffix = [b' ', b'c', b'h', b'0' + index % 10];
        let base = self.name.as_bytes();
        let base_len = base.len().min(NAME_MAX_LEN - suffix.len());
        buf[..base_len].copy_from_slice(&base[..base_len]);
        buf[base_len..base_len + suffix.len()].copy_from_slice(&suffix);
        (buf, base_len + suffix.len())
    }

    /// Every feature the host may request.
    pub fn supported_features(&self) -> Features {
        self.feat_perm | self.feat_conf
    }
}
