//! HiQSDR receive decimation table.
//!
//! The FPGA decimates by a prescaler (8, or 2 for the fastest rates) and a
//! second CIC stage of 1 to 40. The host picks from a fixed list of total
//! decimations and writes the stage-2 value minus one, plus the prescaler
//! bit, into the receive control byte.

use sdrlink_core::decimation::{DecimationChoice, DecimationProfile};

use crate::codec::rx_control;

/// Supported total decimations.
pub const DECIMATIONS: [u32; 9] = [2560, 1280, 640, 512, 320, 256, 128, 80, 64];

/// Range reported for a continuous rate control: the 24-bit sample rates.
pub const RATE_RANGE: (u32, u32) = (48_000, 960_000);

/// Receive control used during a VNA sweep: stage 2 of 40.
pub const VNA_RX_CONTROL: u8 = 40 - 1;

/// Receive control settings for one total decimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HiqDecimation {
    pub decimation: u32,
    pub rx_control: u8,
    /// Bytes per I or Q sample in the sample stream.
    pub sample_bytes: u8,
}

impl HiqDecimation {
    pub fn new(decimation: u32) -> Self {
        if decimation >= 128 {
            HiqDecimation {
                decimation,
                rx_control: (decimation / 64 - 1) as u8,
                sample_bytes: 3,
            }
        } else {
            HiqDecimation {
                decimation,
                rx_control: (decimation / 16 - 1) as u8 | rx_control::PRESCALER_2,
                sample_bytes: 2,
            }
        }
    }

    pub fn rate_hz(&self, clock_hz: f64) -> u32 {
        (clock_hz / self.decimation as f64).round() as u32
    }
}

/// Rate table for a sample clock, slowest first.
pub fn profile(clock_hz: f64) -> DecimationProfile<HiqDecimation> {
    DecimationProfile::new(
        DECIMATIONS
            .iter()
            .map(|&d| {
                let dec = HiqDecimation::new(d);
                DecimationChoice::new(dec, dec.rate_hz(clock_hz))
            })
            .collect(),
    )
}

/// Index to start with: the entry nearest the configured rate, else the
/// configured decimation if the table has it, else the slowest rate.
pub fn initial_index(
    profile: &DecimationProfile<HiqDecimation>,
    sample_rate: Option<u32>,
    decimation: Option<u32>,
) -> usize {
    let by_decimation = |d: u32| {
        profile
            .choices()
            .iter()
            .position(|c| c.code.decimation == d)
    };
    sample_rate
        .filter(|&r| r > 0)
        .and_then(|r| profile.select_index(r))
        .or_else(|| decimation.and_then(by_decimation))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK: f64 = 122_880_000.0;

    #[test]
    fn receive_control_codes() {
        assert_eq!(HiqDecimation::new(2560).rx_control, 39);
        assert_eq!(HiqDecimation::new(128).rx_control, 1);
        assert_eq!(HiqDecimation::new(128).sample_bytes, 3);
        assert_eq!(HiqDecimation::new(80).rx_control, 4 | 0x40);
        assert_eq!(HiqDecimation::new(64).rx_control, 3 | 0x40);
        assert_eq!(HiqDecimation::new(64).sample_bytes, 2);
    }

    #[test]
    fn rate_table() {
        let p = profile(CLOCK);
        let rates: Vec<u32> = p.choices().iter().map(|c| c.rate_hz).collect();
        assert_eq!(
            rates,
            vec![48_000, 96_000, 192_000, 240_000, 384_000, 480_000, 960_000, 1_536_000, 1_920_000]
        );
        assert_eq!(p.labels()[3], "240");
        assert_eq!(p.range(), Some((48_000, 1_920_000)));
    }

    #[test]
    fn initial_selection() {
        let p = profile(CLOCK);
        assert_eq!(initial_index(&p, Some(192_000), None), 2);
        // 100 ksps is not a table rate; the nearest one wins over the
        // configured decimation.
        assert_eq!(initial_index(&p, Some(100_000), Some(64)), 1);
        assert_eq!(initial_index(&p, None, Some(64)), 8);
        assert_eq!(initial_index(&p, None, Some(77)), 0);
        assert_eq!(initial_index(&p, Some(0), None), 0);
    }
}
