//! PLL and DCO synthesizer register calculation.
//!
//! Two synthesizer families are supported:
//!
//! - [`synthesize`] computes the six register words of an ADF4351-style
//!   integer-N PLL. The device output runs at twice the wanted LO, so the
//!   search works on `2 * target`.
//! - [`si570_registers`] computes the HSDIV/N1/RFREQ fields of an Si570
//!   crystal oscillator, packed into the six command bytes the firmware
//!   expects.
//!
//! - [`ad9951_word`] computes the frequency tuning word of an AD9951 DDS,
//!   used where a DDS serves as the tunable reference of an ADF4351.
//!
//! The PLL and DCO searches walk a set of output dividers looking for an oscillator frequency
//! inside the device's legal range. Which divider is tried first is a
//! [`DividerOrder`] chosen per device family, since it decides which
//! solution wins when more than one fits.
//!
//! Out-of-range targets are clamped, not rejected: the caller always gets
//! back the frequency actually synthesized.

use crate::error::{Error, Result};

/// Lowest legal ADF4351 VCO frequency.
pub const ADF4351_VCO_MIN_HZ: f64 = 2.2e9;
/// ADF4351 VCO upper bound (exclusive).
pub const ADF4351_VCO_MAX_HZ: f64 = 4.4e9;
/// Largest RF divider exponent (divide by 64).
pub const ADF4351_MAX_DIVIDER_EXP: u8 = 6;

/// Order in which output dividers are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DividerOrder {
    /// Smallest divider first. The ADF4351 uses this, giving the smallest
    /// divider exponent that puts the VCO in range.
    Ascending,
    /// Largest divider first. The Si570 walks HSDIV from 11 down to 4.
    Descending,
}

/// Fixed (non-frequency) fields of the ADF4351 register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adf4351Fields {
    /// Integer-N mode (fractional numerator ignored, LDF/LDP set for INT).
    pub int_mode: bool,
    /// Fractional modulus, R1 bits 3..14.
    pub modulus: u16,
    /// Fractional numerator, R0 bits 3..14.
    pub frac_value: u16,
    /// Band select clock divider, R4 bits 12..19.
    pub band_select_div: u8,
    /// Auxiliary output enable and power, R4 bits 6..8.
    pub aux_output: u8,
}

impl Default for Adf4351Fields {
    fn default() -> Self {
        Adf4351Fields {
            int_mode: true,
            modulus: 23,
            frac_value: 0,
            band_select_div: 40,
            aux_output: 0b101,
        }
    }
}

/// Six 32-bit register words, R0 through R5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PllRegisterSet {
    pub words: [u32; 6],
}

impl PllRegisterSet {
    /// Wire size of a register block.
    pub const WIRE_LEN: usize = 24;

    /// Registers as little-endian bytes, R0 first.
    pub fn to_le_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Inverse of [`to_le_bytes`](Self::to_le_bytes). Returns `None` if
    /// `bytes` is shorter than a register block.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::WIRE_LEN)?;
        let mut words = [0u32; 6];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(PllRegisterSet { words })
    }
}

/// Which side of the VCO range a target was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    Low,
    High,
}

/// Result of an ADF4351 synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synthesis {
    pub registers: PllRegisterSet,
    /// Frequency actually produced at the LO, after rounding N.
    pub actual_hz: f64,
    /// RF divider exponent (divide by `2^rf_divider`).
    pub rf_divider: u8,
    /// Integer multiplier N.
    pub int_value: u16,
    pub vco_hz: f64,
    /// Set when the target was outside the reachable range.
    pub clamped: Option<Clamp>,
}

/// Compute ADF4351 registers for an LO of `target_hz`.
///
/// The phase-frequency detector runs at `ref_clock_hz / 2 / r_counter`.
/// Errors are returned only for a degenerate reference (non-positive clock
/// or zero R counter); an unreachable target is clamped to the nearest
/// range boundary and reported through [`Synthesis::clamped`].
pub fn synthesize(
    target_hz: f64,
    ref_clock_hz: f64,
    r_counter: u16,
    fields: &Adf4351Fields,
    order: DividerOrder,
) -> Result<Synthesis> {
    if !(ref_clock_hz.is_finite() && ref_clock_hz > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "reference clock must be positive, got {ref_clock_hz}"
        )));
    }
    if r_counter == 0 || r_counter > 0x3FF {
        return Err(Error::InvalidParameter(format!(
            "R counter must be 1..=1023, got {r_counter}"
        )));
    }

    let fpfd = ref_clock_hz / 2.0 / r_counter as f64;
    let lo2 = target_hz * 2.0;

    let exponents: Vec<u8> = match order {
        DividerOrder::Ascending => (0..=ADF4351_MAX_DIVIDER_EXP).collect(),
        DividerOrder::Descending => (0..=ADF4351_MAX_DIVIDER_EXP).rev().collect(),
    };

    let found = exponents.into_iter().find_map(|d| {
        let vco = lo2 * (1u32 << d) as f64;
        (ADF4351_VCO_MIN_HZ..ADF4351_VCO_MAX_HZ)
            .contains(&vco)
            .then(|| (d, (vco / fpfd).round(), None))
    });

    let (rf_divider, n, clamped) = match found {
        Some(hit) => hit,
        None => {
            let max_div = (1u32 << ADF4351_MAX_DIVIDER_EXP) as f64;
            if lo2 * max_div >= ADF4351_VCO_MIN_HZ {
                (0, (ADF4351_VCO_MAX_HZ / fpfd).floor(), Some(Clamp::High))
            } else {
                (
                    ADF4351_MAX_DIVIDER_EXP,
                    (ADF4351_VCO_MIN_HZ / fpfd).ceil(),
                    Some(Clamp::Low),
                )
            }
        }
    };

    let int_value = n.clamp(0.0, u16::MAX as f64) as u16;
    let vco_hz = fpfd * int_value as f64;
    let actual_hz = 0.5 * vco_hz / (1u32 << rf_divider) as f64;

    if let Some(side) = clamped {
        tracing::debug!(
            target_hz = target_hz,
            actual_hz = actual_hz,
            side = ?side,
            "PLL target outside VCO range, clamped"
        );
    }

    Ok(Synthesis {
        registers: pack_adf4351(int_value, r_counter, rf_divider, fields),
        actual_hz,
        rf_divider,
        int_value,
        vco_hz,
        clamped,
    })
}

impl Synthesis {
    /// Reference frequency that puts this synthesis' LO exactly on `lo_hz`.
    ///
    /// Used when the reference is itself tunable: the divider and N stay
    /// fixed and the reference moves instead. `None` if N is zero.
    pub fn reference_for(&self, lo_hz: f64, r_counter: u16) -> Option<f64> {
        if self.int_value == 0 {
            return None;
        }
        let divider = (1u32 << self.rf_divider) as f64;
        Some(2.0 * r_counter as f64 * divider / self.int_value as f64 * (lo_hz * 2.0))
    }

    /// LO produced with these registers when the reference runs at `ref_hz`.
    pub fn lo_for_reference(&self, ref_hz: f64, r_counter: u16) -> f64 {
        let vco = ref_hz / 2.0 / r_counter as f64 * self.int_value as f64;
        0.5 * vco / (1u32 << self.rf_divider) as f64
    }
}

fn pack_adf4351(
    int_value: u16,
    r_counter: u16,
    rf_divider: u8,
    f: &Adf4351Fields,
) -> PllRegisterSet {
    let int_mode = f.int_mode as u32;
    let r0 = (int_value as u32) << 15 | ((f.frac_value as u32) & 0xFFF) << 3;
    let r1 = 0x0800_8001 | ((f.modulus as u32) & 0xFFF) << 3;
    let r2 = 0x0100_1E42 | ((r_counter as u32) & 0x3FF) << 14 | int_mode << 8 | int_mode << 7;
    let r3 = 0x0004_0003 | int_mode << 22 | int_mode << 21;
    let r4 = 0x0080_043C
        | ((rf_divider as u32) & 0x7) << 20
        | (f.band_select_div as u32) << 12
        | ((f.aux_output as u32) & 0x7) << 6;
    let r5 = 0x0058_0005;
    PllRegisterSet {
        words: [r0, r1, r2, r3, r4, r5],
    }
}

/// Lowest legal Si570 DCO frequency.
pub const SI570_DCO_MIN_HZ: f64 = 4.85e9;
/// Highest legal Si570 DCO frequency.
pub const SI570_DCO_MAX_HZ: f64 = 5.67e9;
/// Legal high-speed divider values.
pub const SI570_HSDIV: [u8; 6] = [4, 5, 6, 7, 9, 11];

/// Si570 divider and multiplier fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Si570Registers {
    pub hs_div: u8,
    pub n1: u8,
    pub rfreq_int: u16,
    pub rfreq_frac: u32,
    pub dco_hz: f64,
}

impl Si570Registers {
    /// Pack into the six-byte command (registers 7..12 of the part).
    pub fn to_bytes(&self) -> [u8; 6] {
        let n1 = self.n1 as u32 - 1;
        let hs = self.hs_div as u32 - 4;
        let rint = self.rfreq_int as u32;
        let b0 = (hs << 5 | n1 >> 2) as u8;
        let b1 = ((n1 & 0x3) << 6 | rint >> 4) as u8;
        let tail = (rint & 0xF) << 28 | (self.rfreq_frac & 0x0FFF_FFFF);
        let t = tail.to_be_bytes();
        [b0, b1, t[0], t[1], t[2], t[3]]
    }
}

/// Find Si570 settings for `freq_hz * multiplier` against crystal `xtal_hz`.
///
/// The lowest DCO frequency wins; among equal DCO frequencies the first
/// divider tried is kept. Returns `None` when no HSDIV/N1 combination puts
/// the DCO in range.
pub fn si570_registers(
    freq_hz: f64,
    multiplier: f64,
    xtal_hz: f64,
    order: DividerOrder,
) -> Option<Si570Registers> {
    let freq = freq_hz * multiplier;
    if !(freq > 0.0 && xtal_hz > 0.0) {
        return None;
    }

    let hs_divs: Vec<u8> = match order {
        DividerOrder::Ascending => SI570_HSDIV.to_vec(),
        DividerOrder::Descending => SI570_HSDIV.iter().rev().copied().collect(),
    };

    let mut best: Option<(u8, u8, f64)> = None;
    for hs in hs_divs {
        // N1 is always rounded up to an even value.
        let n1 = ((SI570_DCO_MIN_HZ / (freq * hs as f64)).ceil() as u32)
            .max(1)
            .div_ceil(2)
            * 2;
        if n1 > 128 {
            continue;
        }
        let dco = freq * hs as f64 * n1 as f64;
        if !(SI570_DCO_MIN_HZ..=SI570_DCO_MAX_HZ).contains(&dco) {
            continue;
        }
        if best.is_none_or(|(_, _, b)| dco < b) {
            best = Some((hs, n1 as u8, dco));
        }
    }

    let (hs_div, n1, dco_hz) = best?;
    let rfreq = dco_hz / xtal_hz;
    let rfreq_int = rfreq.trunc() as u16;
    let rfreq_frac =
        (((rfreq - rfreq.trunc()) * (1u32 << 28) as f64).round() as u32).min(0x0FFF_FFFF);
    Some(Si570Registers {
        hs_div,
        n1,
        rfreq_int,
        rfreq_frac,
        dco_hz,
    })
}

/// Leading byte of the AD9951 command block.
pub const AD9951_COMMAND_HEAD: u8 = 40;
/// Trailing byte of the AD9951 command block.
pub const AD9951_COMMAND_TAIL: u8 = 4;

/// AD9951 frequency tuning word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ad9951Word {
    pub phase: u32,
    /// Output frequency the word produces.
    pub actual_hz: f64,
}

impl Ad9951Word {
    /// The six-byte command: head byte, the tuning word little-endian, tail
    /// byte.
    pub fn to_bytes(&self) -> [u8; 6] {
        let p = self.phase.to_le_bytes();
        [AD9951_COMMAND_HEAD, p[0], p[1], p[2], p[3], AD9951_COMMAND_TAIL]
    }
}

/// Tuning word for `freq_hz` on a DDS clocked at `clock_hz`.
///
/// Returns `None` when the frequency does not fit a 32-bit tuning word
/// (negative, or at or above the clock).
pub fn ad9951_word(freq_hz: f64, clock_hz: f64) -> Option<Ad9951Word> {
    if !(clock_hz > 0.0) {
        return None;
    }
    let phase = (freq_hz / clock_hz * 4_294_967_296.0 + 0.5).floor();
    if !(0.0..=u32::MAX as f64).contains(&phase) {
        return None;
    }
    let phase = phase as u32;
    Some(Ad9951Word {
        phase,
        actual_hz: phase as f64 * clock_hz / 4_294_967_296.0,
    })
}
