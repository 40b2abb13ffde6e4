//! Timestamp reconstruction for frames drained from a hardware FIFO in one
//! batch.
//!
//! Only the drain time `tsc` is known. Frames go back to back on the bus, so
//! the youngest frame is stamped `tsc` and each older frame is stamped with
//! the timestamp of its successor minus the successor's on-wire duration.
//! The computed durations include two bits of interframe space.
use crate::core::{dlc_to_len, CanFrame, FrameFlags, TxEvent};
use crate::protocol::timing::BitTiming;

/// On-wire bit counts of one frame, split by bit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameBits {
    /// Bits sent at the nominal (arbitration) rate.
    pub nominal: u32,
    /// Bits sent at the data rate; zero unless `BRS` is set.
    pub data: u32,
}

// SOF is counted and the interframe space is shortened to 2 bits: the
// third intermission bit may already be the next SOF.
const TAIL_BITS: u32 = 1 /* CRC delimiter */ + 1 /* ACK slot */ + 1 /* ACK delimiter */ + 7 /* EOF */ + 2 /* IFS */;

/// Bit counts for a frame of the given format.
pub fn frame_bits(flags: FrameFlags, dlc: u8) -> FrameBits {
    let ext = flags.contains(FrameFlags::EXT);
    let payload_bits = dlc_to_len(dlc) as u32 * 8;

    if flags.contains(FrameFlags::FDF) {
        // Stuff count, parity and fixed stuff bits precede the CRC.
        let crc_bits = if (dlc & 0x0F) <= 10 { 17 + 4 + 5 } else { 21 + 4 + 6 };
        let arbitration = if ext {
            1 /* SOF */ + 11 + 1 /* SRR */ + 1 /* IDE */ + 18 + 1 /* r1 */ + 1 /* EDL */ + 1 /* r0 */ + 1 /* BRS */
        } else {
            1 /* SOF */ + 11 + 1 /* r1 */ + 1 /* IDE */ + 1 /* EDL */ + 1 /* r0 */ + 1 /* BRS */
        };
        let body = 1 /* ESI */ + 4 /* DLC */ + payload_bits + crc_bits;
        if flags.contains(FrameFlags::BRS) {
            FrameBits {
                nominal: arbitration + TAIL_BITS,
                data: body,
            }
        } else {
            FrameBits {
                nominal: arbitration + body + TAIL_BITS,
                data: 0,
            }
        }
    } else {
        let payload_bits = if flags.contains(FrameFlags::RTR) {
            0
        } else {
            payload_bits
        };
        let header = if ext {
            1 /* SOF */ + 11 + 1 /* SRR */ + 1 /* IDE */ + 18 + 1 /* RTR */ + 2 /* r1 r0 */ + 4 /* DLC */
        } else {
            1 /* SOF */ + 11 + 1 /* RTR */ + 1 /* IDE */ + 1 /* r0 */ + 4 /* DLC */
        };
        FrameBits {
            nominal: header + payload_bits + 15 /* CRC */ + TAIL_BITS,
            data: 0,
        }
    }
}

/// Precomputed bit durations of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitDurations {
    pub nm_us_per_bit: u32,
    pub dt_us_per_bit_shift8: u32,
}

impl BitDurations {
    pub fn new(nominal: &BitTiming, data: &BitTiming, can_clk_hz: u32) -> Self {
        Self {
            nm_us_per_bit: nominal.us_per_bit(can_clk_hz),
            dt_us_per_bit_shift8: data.us_per_bit_shift8(can_clk_hz),
        }
    }

    /// Duration of a frame in microseconds.
    #[inline]
    pub fn frame_time_us(&self, bits: FrameBits) -> u32 {
        self.nm_us_per_bit
            .wrapping_mul(bits.nominal)
            .wrapping_add(self.dt_us_per_bit_shift8.wrapping_mul(bits.data) >> 8)
    }
}

/// Entry of a drained batch that can carry a reconstructed timestamp.
pub trait Timestamped {
    fn frame_flags(&self) -> FrameFlags;
    fn frame_dlc(&self) -> u8;
    fn set_timestamp(&mut self, timestamp_us: u32);
}

impl Timestamped for CanFrame {
    fn frame_flags(&self) -> FrameFlags {
        self.flags
    }

    fn frame_dlc(&self) -> u8 {
        self.dlc
    }

    fn set_timestamp(&mut self, timestamp_us: u32) {
        self.timestamp_us = timestamp_us;
    }
}

impl Timestamped for TxEvent {
    fn frame_flags(&self) -> FrameFlags {
        self.flags
    }

    fn frame_dlc(&self) -> u8 {
        self.dlc
    }

    fn set_timestamp(&mut self, timestamp_us: u32) {
        self.timestamp_us = timestamp_us;
    }
}

/// Assigns timestamps to drained batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampReconstructor {
    durations: BitDurations,
}

impl TimestampReconstructor {
    pub const fn new(durations: BitDurations) -> Self {
        Self { durations }
    }

    pub fn durations(&self) -> BitDurations {
        self.durations
    }

    pub fn set_durations(&mut self, durations: BitDurations) {
        self.durations = durations;
    }

    /// Stamp a batch ordered oldest first. `extra_nominal_bits` is added to
    /// every frame; transmit events use it for transmitter delay
    /// compensation.
    pub fn stamp<T: Timestamped>(&self, batch: &mut [T], tsc: u32, extra_nominal_bits: u32) {
        let mut ts = tsc;
        for entry in batch.iter_mut().rev() {
            entry.set_timestamp(ts);
            let mut bits = frame_bits(entry.frame_flags(), entry.frame_dlc());
            bits.nominal += extra_nominal_bits;
            ts = ts.wrapping_sub(self.durations.frame_time_us(bits));
        }
    }

    /// Stamp received frames.
    pub fn stamp_rx(&self, frames: &mut [CanFrame], tsc: u32) {
        self.stamp(frames, tsc, 0);
    }

    /// Stamp transmit events. `tdc` is the transmitter delay compensation
    /// in bits, counted twice.
    pub fn stamp_tx(&self, events: &mut [TxEvent], tsc: u32, tdc: u32) {
        self.stamp(events, tsc, tdc * 2);
    }
}
