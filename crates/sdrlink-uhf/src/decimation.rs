//! UHF transceiver sample rates.
//!
//! Both channels run a two-stage CIC followed by a fixed decimate-by-10.
//! Channel 0 is fixed at 6 x 12 x 10. Channel 1 picks its first stage from
//! the rate and derives the second; in scan mode it stays at 1152 ksps and
//! the FPGA steps through `blocks` adjacent 1152 kHz slices.

use sdrlink_core::decimation::{DecimationChoice, DecimationProfile};

use crate::codec::Stages;

/// Channel 0 decimation.
pub const CH0_STAGES: Stages = Stages::new(6, 12);
/// Final fixed decimation after the two CIC stages.
pub const STAGE3: u32 = 10;
/// Continuous sample rates, ksps.
pub const FIXED_RATES_KSPS: [u32; 7] = [48, 96, 192, 384, 768, 1152, 1728];
/// Scan block counts.
pub const SCAN_BLOCKS: [u8; 6] = [2, 3, 5, 9, 19, 31];
/// Sample rate of one scan block.
pub const SCAN_BLOCK_RATE_HZ: u32 = 1_152_000;
/// Usable fraction of each scan block; adjacent blocks are this far apart.
pub const SCAN_VALID_FRACTION: f64 = 0.84;
/// Default when no rate is configured.
pub const DEFAULT_RATE_HZ: u32 = 192_000;
/// Range reported for a continuous rate control.
pub const RATE_RANGE: (u32, u32) = (48_000, 1_152_000);

/// Channel 1 setting for one selector entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UhfRate {
    Fixed { stages: Stages },
    Scan { blocks: u8 },
}

impl UhfRate {
    pub fn stages(&self) -> Stages {
        match self {
            UhfRate::Fixed { stages } => *stages,
            UhfRate::Scan { .. } => Stages::new(2, 3),
        }
    }

    pub fn scan_blocks(&self) -> u8 {
        match self {
            UhfRate::Fixed { .. } => 0,
            UhfRate::Scan { blocks } => *blocks,
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, UhfRate::Scan { .. })
    }
}

/// Channel 1 stages for a continuous rate.
pub fn stages_for(rate_hz: u32, nominal_clock_hz: f64) -> Stages {
    let first: u32 = if rate_hz >= 1_152_000 {
        2
    } else if rate_hz >= 192_000 {
        3
    } else if rate_hz == 96_000 {
        6
    } else {
        12
    };
    let second = (nominal_clock_hz as u64 / rate_hz.max(1) as u64 / first as u64 / STAGE3 as u64)
        .max(1) as u16;
    Stages::new(first as u16, second)
}

/// Selector table, slowest first. Scan entries follow the fixed rates.
pub fn profile(nominal_clock_hz: f64) -> DecimationProfile<UhfRate> {
    let fixed = FIXED_RATES_KSPS.iter().map(|&k| {
        let rate = k * 1000;
        DecimationChoice::new(
            UhfRate::Fixed {
                stages: stages_for(rate, nominal_clock_hz),
            },
            rate,
        )
    });
    let scan = SCAN_BLOCKS.iter().map(|&blocks| {
        DecimationChoice::labelled(
            UhfRate::Scan { blocks },
            SCAN_BLOCK_RATE_HZ * blocks as u32,
            &format!("{blocks}X"),
        )
    });
    DecimationProfile::new(fixed.chain(scan).collect())
}

/// Starting index: the entry nearest the configured rate capped at
/// 1152 ksps, or 192 ksps when none is configured. The cap keeps the
/// start out of scan mode.
pub fn initial_index(profile: &DecimationProfile<UhfRate>, sample_rate: Option<u32>) -> usize {
    let requested = sample_rate
        .filter(|&r| r > 0)
        .unwrap_or(DEFAULT_RATE_HZ)
        .min(SCAN_BLOCK_RATE_HZ);
    profile.select_index(requested).unwrap_or(0)
}
