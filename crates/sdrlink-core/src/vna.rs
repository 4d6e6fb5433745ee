//! VNA sweep planning.
//!
//! A sweep steps the transmit NCO from a start phase by a fixed phase
//! increment once per point. Both are integers, so the realized endpoints
//! differ from the request; [`plan_sweep`] returns them and callers must
//! label calibration data and plots with those, not the request.

use crate::error::{Error, Result};
use crate::nco::{NcoPhase, to_freq, to_phase};

/// A requested sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VnaSweepSpec {
    pub start_hz: f64,
    pub stop_hz: f64,
    /// Number of points, at least 2.
    pub points: u16,
}

impl VnaSweepSpec {
    pub fn new(start_hz: f64, stop_hz: f64, points: u16) -> Result<Self> {
        let spec = VnaSweepSpec {
            start_hz,
            stop_hz,
            points,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.points < 2 {
            return Err(Error::InvalidParameter(format!(
                "sweep needs at least 2 points, got {}",
                self.points
            )));
        }
        if !(self.start_hz.is_finite() && self.stop_hz.is_finite()) || self.stop_hz < self.start_hz
        {
            return Err(Error::InvalidParameter(format!(
                "invalid sweep range {} to {}",
                self.start_hz, self.stop_hz
            )));
        }
        Ok(())
    }
}

/// Realized sweep endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepEndpoints {
    pub start_hz: f64,
    pub stop_hz: f64,
}

/// Phase values programmed for a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPlan {
    pub start_phase: NcoPhase,
    pub delta_phase: NcoPhase,
    pub points: u16,
    pub endpoints: SweepEndpoints,
}

impl SweepPlan {
    /// Realized frequency of point `index`.
    pub fn point_hz(&self, index: u16, clock_hz: f64) -> f64 {
        self.start_phase
            .step(self.delta_phase, index as u32)
            .freq(clock_hz)
    }
}

/// Compute start phase and per-point increment for `spec`.
///
/// `delta = (phase(stop) - phase(start)) / (points - 1)` in integer
/// arithmetic; the truncation remainder is why the realized stop sits up to
/// `points - 2` phase units below the request.
pub fn plan_sweep(spec: &VnaSweepSpec, clock_hz: f64) -> Result<SweepPlan> {
    spec.validate()?;
    let start = to_phase(spec.start_hz, clock_hz);
    let stop = to_phase(spec.stop_hz, clock_hz);
    let span = stop.wrapping_sub(start);
    let delta = span / (spec.points as u32 - 1);

    let start_phase = NcoPhase(start);
    let delta_phase = NcoPhase(delta);
    let last = start_phase.step(delta_phase, spec.points as u32 - 1);
    Ok(SweepPlan {
        start_phase,
        delta_phase,
        points: spec.points,
        endpoints: SweepEndpoints {
            start_hz: to_freq(start, clock_hz),
            stop_hz: last.freq(clock_hz),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nco::quantum;

    const CLOCK: f64 = 122_880_000.0;

    #[test]
    fn zero_to_sixty_megahertz_in_4000_points() {
        let spec = VnaSweepSpec::new(0.0, 60e6, 4000).unwrap();
        let plan = plan_sweep(&spec, CLOCK).unwrap();

        let expected_delta = (to_phase(60e6, CLOCK) - to_phase(0.0, CLOCK)) / 3999;
        assert_eq!(plan.delta_phase.raw(), expected_delta);
        assert_eq!(plan.delta_phase.raw(), 524_419);
        assert_eq!(plan.start_phase.raw(), 0);
        assert_eq!(plan.endpoints.start_hz, 0.0);

        let recomputed = to_freq(plan.start_phase.raw() + plan.delta_phase.raw() * 3999, CLOCK);
        assert!((plan.endpoints.stop_hz - recomputed).abs() < quantum(CLOCK));
        // Truncation leaves the last point within one step of the request.
        assert!(60e6 - plan.endpoints.stop_hz < plan.delta_phase.freq(CLOCK));
        assert!(plan.endpoints.stop_hz <= 60e6);
    }

    #[test]
    fn point_frequencies_are_evenly_spaced() {
        let spec = VnaSweepSpec::new(1e6, 31e6, 301).unwrap();
        let plan = plan_sweep(&spec, CLOCK).unwrap();
        let step = plan.point_hz(1, CLOCK) - plan.point_hz(0, CLOCK);
        assert!((step - 100_000.0).abs() < 1.0);
        assert_eq!(plan.point_hz(300, CLOCK), plan.endpoints.stop_hz);
    }

    #[test]
    fn rejects_short_or_inverted_sweeps() {
        assert!(VnaSweepSpec::new(0.0, 60e6, 1).is_err());
        assert!(VnaSweepSpec::new(60e6, 0.0, 100).is_err());
        assert!(VnaSweepSpec::new(0.0, f64::INFINITY, 100).is_err());
        let bad = VnaSweepSpec {
            start_hz: 0.0,
            stop_hz: 1e6,
            points: 0,
        };
        assert!(plan_sweep(&bad, CLOCK).is_err());
    }

    #[test]
    fn single_frequency_sweep() {
        let spec = VnaSweepSpec::new(10e6, 10e6, 2).unwrap();
        let plan = plan_sweep(&spec, CLOCK).unwrap();
        assert_eq!(plan.delta_phase.raw(), 0);
        assert_eq!(plan.endpoints.start_hz, plan.endpoints.stop_hz);
    }
}
