use super::*;

const CLK: u32 = 80_000_000;

fn nominal_range() -> BitTimingRange {
    BitTimingRange::new(BitTiming::new(1, 1, 2, 2), BitTiming::new(512, 128, 256, 128))
}

#[test]
/// 500 kbit/s at 80 MHz with an 80 % sample point.
fn test_bitrate_and_sample_point() {
    let bt = BitTiming::new(1, 32, 127, 32);
    assert_eq!(bt.ticks_per_bit(), 160);
    assert_eq!(bt.bitrate(CLK), 500_000);
    assert_eq!(bt.sample_point_permille(), 800);
}

#[test]
/// Zero prescaler does not divide by zero.
fn test_bitrate_zero_prescaler() {
    assert_eq!(BitTiming::default().bitrate(CLK), 0);
    assert_eq!(BitTiming::new(1, 1, 1, 1).us_per_bit(0), 0);
}

#[test]
/// Bit durations in whole and fixed-point microseconds.
fn test_us_per_bit() {
    let nominal = BitTiming::new(1, 32, 127, 32);
    assert_eq!(nominal.us_per_bit(CLK), 2);
    assert_eq!(nominal.us_per_bit_shift8(CLK), 512);

    // 4 Mbit/s: a quarter microsecond per bit.
    let data = BitTiming::new(1, 4, 14, 5);
    assert_eq!(data.bitrate(CLK), 4_000_000);
    assert_eq!(data.us_per_bit(CLK), 0);
    assert_eq!(data.us_per_bit_shift8(CLK), 64);
}

#[test]
/// Fields above the maximum are clamped down, others left alone.
fn test_clamp_brp_above_max() {
    let requested = BitTiming::new(1000, 32, 127, 32);
    let clamped = nominal_range().clamp(&requested);
    assert_eq!(clamped, BitTiming::new(512, 32, 127, 32));
    assert_eq!(clamped.bitrate(CLK), CLK / (512 * 160));
}

#[test]
/// Each field is clamped independently in both directions.
fn test_clamp_each_field() {
    let requested = BitTiming::new(0, 0, 300, 1);
    let clamped = nominal_range().clamp(&requested);
    assert_eq!(clamped, BitTiming::new(1, 1, 256, 2));
    assert!(nominal_range().contains(&clamped));
    assert!(!nominal_range().contains(&requested));
}
