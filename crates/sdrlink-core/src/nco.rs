//! Numerically-controlled oscillator phase math.
//!
//! Tuning words are 32-bit unsigned fractions of the sample clock:
//! `phase = round(freq / clock * 2^32) mod 2^32`. Frequencies outside
//! `[0, clock)` alias modulo the clock; negative offsets become the
//! corresponding high phase value. Neither conversion can fail.

use std::fmt;

/// `2^32` as a float, the full-scale phase accumulator span.
pub const PHASE_SPAN: f64 = 4_294_967_296.0;

/// Convert a frequency to a 32-bit tuning word for an NCO clocked at `clock_hz`.
///
/// Non-finite results (zero clock, NaN input) map to phase 0.
///
/// ```
/// use sdrlink_core::nco::{to_freq, to_phase};
///
/// let phase = to_phase(7_000_000.0, 122_880_000.0);
/// assert_eq!(phase, 244_667_733);
/// assert!((to_freq(phase, 122_880_000.0) - 7_000_000.0).abs() < 0.03);
/// ```
pub fn to_phase(freq_hz: f64, clock_hz: f64) -> u32 {
    let scaled = (freq_hz / clock_hz * PHASE_SPAN).round();
    if !scaled.is_finite() {
        return 0;
    }
    let wrapped = scaled.rem_euclid(PHASE_SPAN);
    // rem_euclid can land exactly on the span for tiny negative inputs.
    (wrapped as u64 & 0xFFFF_FFFF) as u32
}

/// Convert a tuning word back to the frequency it realizes.
pub fn to_freq(phase: u32, clock_hz: f64) -> f64 {
    phase as f64 * clock_hz / PHASE_SPAN
}

/// The frequency resolution of an NCO clocked at `clock_hz`.
pub fn quantum(clock_hz: f64) -> f64 {
    clock_hz / PHASE_SPAN
}

/// A 32-bit NCO tuning word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NcoPhase(pub u32);

impl NcoPhase {
    /// Tuning word for `freq_hz` at `clock_hz`.
    pub fn from_freq(freq_hz: f64, clock_hz: f64) -> Self {
        NcoPhase(to_phase(freq_hz, clock_hz))
    }

    /// Frequency realized by this tuning word.
    pub fn freq(self, clock_hz: f64) -> f64 {
        to_freq(self.0, clock_hz)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Advance by `steps` increments of `delta`, wrapping.
    pub fn step(self, delta: NcoPhase, steps: u32) -> NcoPhase {
        NcoPhase(self.0.wrapping_add(delta.0.wrapping_mul(steps)))
    }
}

impl From<NcoPhase> for u32 {
    fn from(phase: NcoPhase) -> u32 {
        phase.0
    }
}

impl fmt::Display for NcoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK: f64 = 122_880_000.0;

    #[test]
    fn seven_megahertz_scenario() {
        let phase = to_phase(7_000_000.0, CLOCK);
        assert_eq!(phase, 244_667_733);
        assert!((to_freq(phase, CLOCK) - 7_000_000.0).abs() < 0.03);
    }

    #[test]
    fn round_trip_within_one_quantum() {
        let q = quantum(CLOCK);
        let mut freq = 0.0;
        while freq < CLOCK {
            let back = to_freq(to_phase(freq, CLOCK), CLOCK);
            // Top of the band rounds up to 2^32 and wraps to 0.
            if to_phase(freq, CLOCK) != 0 || freq < q {
                assert!((back - freq).abs() <= q, "freq {freq} came back as {back}");
            }
            freq += 1_234_567.891;
        }
    }

    #[test]
    fn exact_fractions_are_exact() {
        // 60 MHz at 122.88 MHz is exactly 125/256 of the clock.
        assert_eq!(to_phase(60_000_000.0, CLOCK), 2_097_152_000);
        assert_eq!(to_phase(0.0, CLOCK), 0);
        assert_eq!(to_phase(CLOCK / 2.0, CLOCK), 0x8000_0000);
    }

    #[test]
    fn negative_frequencies_alias() {
        assert_eq!(to_phase(-CLOCK / 4.0, CLOCK), 0xC000_0000);
        let tiny = to_phase(-1e-6, CLOCK);
        assert_eq!(tiny, 0);
    }

    #[test]
    fn above_clock_wraps() {
        assert_eq!(
            to_phase(CLOCK + 7_000_000.0, CLOCK),
            to_phase(7_000_000.0, CLOCK)
        );
    }

    #[test]
    fn degenerate_clock_is_total() {
        assert_eq!(to_phase(7_000_000.0, 0.0), 0);
        assert_eq!(to_phase(f64::NAN, CLOCK), 0);
    }

    #[test]
    fn phase_step_wraps() {
        let start = NcoPhase(0xFFFF_FF00);
        let next = start.step(NcoPhase(0x100), 2);
        assert_eq!(next, NcoPhase(0x100));
    }

    #[test]
    fn phase_display_is_hex() {
        assert_eq!(NcoPhase(0xBEEF).to_string(), "0x0000BEEF");
    }
}
