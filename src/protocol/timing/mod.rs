//! Bit-timing parameters, hardware ranges and the derived bit durations.
//!
//! A bit lasts `brp * (1 + tseg1 + tseg2)` CAN clock ticks (one sync
//! segment plus both time segments, each scaled by the prescaler).

/// One set of bit-timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    pub brp: u16,
    pub sjw: u8,
    pub tseg1: u16,
    pub tseg2: u8,
}

impl BitTiming {
    pub const fn new(brp: u16, sjw: u8, tseg1: u16, tseg2: u8) -> Self {
        Self {
            brp,
            sjw,
            tseg1,
            tseg2,
        }
    }

    /// CAN clock ticks per bit.
    #[inline]
    pub fn ticks_per_bit(&self) -> u32 {
        self.brp as u32 * (1 + self.tseg1 as u32 + self.tseg2 as u32)
    }

    /// Resulting bit rate in bit/s; `0` for a zero prescaler.
    pub fn bitrate(&self, can_clk_hz: u32) -> u32 {
        match self.ticks_per_bit() {
            0 => 0,
            ticks => can_clk_hz / ticks,
        }
    }

    /// Sample point in 1/1000 of the bit time.
    pub fn sample_point_permille(&self) -> u16 {
        let total = 1 + self.tseg1 as u32 + self.tseg2 as u32;
        (((1 + self.tseg1 as u32) * 1000) / total) as u16
    }

    /// Whole microseconds per bit.
    pub fn us_per_bit(&self, can_clk_hz: u32) -> u32 {
        if can_clk_hz == 0 {
            return 0;
        }
        (self.ticks_per_bit() as u64 * 1_000_000 / can_clk_hz as u64) as u32
    }

    /// Microseconds per bit as a fixed-point value with 8 fractional bits.
    pub fn us_per_bit_shift8(&self, can_clk_hz: u32) -> u32 {
        if can_clk_hz == 0 {
            return 0;
        }
        ((self.ticks_per_bit() as u64 * 1_000_000 << 8) / can_clk_hz as u64) as u32
    }
}

/// Inclusive per-field limits advertised by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTimingRange {
    pub min: BitTiming,
    pub max: BitTiming,
}

impl BitTimingRange {
    pub const fn new(min: BitTiming, max: BitTiming) -> Self {
        Self { min, max }
    }

    /// Clamp every field into its own range. Fields are clamped
    /// independently, never rejected.
    pub fn clamp(&self, requested: &BitTiming) -> BitTiming {
        BitTiming {
            brp: requested.brp.max(self.min.brp).min(self.max.brp),
            sjw: requested.sjw.max(self.min.sjw).min(self.max.sjw),
            tseg1: requested.tseg1.max(self.min.tseg1).min(self.max.tseg1),
            tseg2: requested.tseg2.max(self.min.tseg2).min(self.max.tseg2),
        }
    }

    pub fn contains(&self, timing: &BitTiming) -> bool {
        self.clamp(timing) == *timing
    }
}

/// Emit the effective bit rate and sample point of an applied timing.
#[allow(unused_variables)]
pub fn log_bit_timing(timing: &BitTiming, can_clk_hz: u32, name: &str) {
    #[cfg(feature = "defmt")]
    defmt::info!(
        "{} brp={} sjw={} tseg1={} tseg2={} bitrate={} sp={}/1000",
        name,
        timing.brp,
        timing.sjw,
        timing.tseg1,
        timing.tseg2,
        timing.bitrate(can_clk_hz),
        timing.sample_point_permille()
    );
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
