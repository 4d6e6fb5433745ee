//! Transient VNA calibration buffers.
//!
//! Each sweep produces one complex reading per point. A
//! [`CalibrationBuffer`] averages repeated sweeps of the same standard;
//! a [`CalibrationSet`] holds the averaged short, open and load (and
//! optionally through) standards and corrects one-port measurements with
//! them. Nothing here is persisted.

use num_complex::Complex64;

use sdrlink_core::error::{Error, Result};

/// Calibration standard connected while sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Standard {
    Short,
    Open,
    Load,
    Through,
}

/// Running sum of sweeps, one slot per sweep point.
#[derive(Debug, Clone)]
pub struct CalibrationBuffer {
    sum: Vec<Complex64>,
    sweeps: usize,
}

impl CalibrationBuffer {
    pub fn new(points: usize) -> Self {
        CalibrationBuffer {
            sum: vec![Complex64::new(0.0, 0.0); points],
            sweeps: 0,
        }
    }

    pub fn points(&self) -> usize {
        self.sum.len()
    }

    /// Number of sweeps accumulated so far.
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Add one complete sweep. Its length must match the buffer.
    pub fn add_sweep(&mut self, readings: &[Complex64]) -> Result<()> {
        if readings.len() != self.sum.len() {
            return Err(Error::InvalidParameter(format!(
                "sweep has {} points, buffer has {}",
                readings.len(),
                self.sum.len()
            )));
        }
        for (acc, r) in self.sum.iter_mut().zip(readings) {
            *acc += *r;
        }
        self.sweeps += 1;
        Ok(())
    }

    /// Mean reading per point, or `None` before the first sweep.
    pub fn average(&self) -> Option<Vec<Complex64>> {
        if self.sweeps == 0 {
            return None;
        }
        let n = self.sweeps as f64;
        Some(self.sum.iter().map(|s| *s / n).collect())
    }

    pub fn clear(&mut self) {
        self.sum.fill(Complex64::new(0.0, 0.0));
        self.sweeps = 0;
    }
}

/// Averaged standards for one sweep plan.
#[derive(Debug, Clone)]
pub struct CalibrationSet {
    points: usize,
    short: CalibrationBuffer,
    open: CalibrationBuffer,
    load: CalibrationBuffer,
    through: CalibrationBuffer,
}

impl CalibrationSet {
    pub fn new(points: usize) -> Self {
        CalibrationSet {
            points,
            short: CalibrationBuffer::new(points),
            open: CalibrationBuffer::new(points),
            load: CalibrationBuffer::new(points),
            through: CalibrationBuffer::new(points),
        }
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn buffer(&self, standard: Standard) -> &CalibrationBuffer {
        match standard {
            Standard::Short => &self.short,
            Standard::Open => &self.open,
            Standard::Load => &self.load,
            Standard::Through => &self.through,
        }
    }

    fn buffer_mut(&mut self, standard: Standard) -> &mut CalibrationBuffer {
        match standard {
            Standard::Short => &mut self.short,
            Standard::Open => &mut self.open,
            Standard::Load => &mut self.load,
            Standard::Through => &mut self.through,
        }
    }

    pub fn add_sweep(&mut self, standard: Standard, readings: &[Complex64]) -> Result<()> {
        self.buffer_mut(standard).add_sweep(readings)
    }

    pub fn clear(&mut self, standard: Standard) {
        self.buffer_mut(standard).clear();
    }

    /// Whether short, open and load all have data.
    pub fn is_reflection_ready(&self) -> bool {
        [&self.short, &self.open, &self.load]
            .iter()
            .all(|b| b.sweeps() > 0)
    }

    /// Correct a one-port measurement to a reflection coefficient using
    /// the short/open/load error model.
    pub fn correct_reflection(&self, measured: &[Complex64]) -> Result<Vec<Complex64>> {
        if measured.len() != self.points {
            return Err(Error::InvalidParameter(format!(
                "measurement has {} points, calibration has {}",
                measured.len(),
                self.points
            )));
        }
        let (Some(ms), Some(mo), Some(ml)) = (
            self.short.average(),
            self.open.average(),
            self.load.average(),
        ) else {
            return Err(Error::InvalidParameter(
                "short, open and load standards are required".into(),
            ));
        };

        let mut out = Vec::with_capacity(measured.len());
        for i in 0..measured.len() {
            let e00 = ml[i];
            let span = mo[i] - ms[i];
            if span.norm() == 0.0 {
                out.push(Complex64::new(f64::NAN, f64::NAN));
                continue;
            }
            let e11 = (mo[i] + ms[i] - 2.0 * ml[i]) / span;
            let tracking = -2.0 * (mo[i] - ml[i]) * (ms[i] - ml[i]) / span;
            let m = measured[i] - e00;
            out.push(m / (tracking + e11 * m));
        }
        Ok(out)
    }

    /// Normalize a transmission measurement by the through standard.
    pub fn correct_transmission(&self, measured: &[Complex64]) -> Result<Vec<Complex64>> {
        let through = self.through.average().ok_or_else(|| {
            Error::InvalidParameter("through standard is required".into())
        })?;
        if measured.len() != through.len() {
            return Err(Error::InvalidParameter(format!(
                "measurement has {} points, calibration has {}",
                measured.len(),
                through.len()
            )));
        }
        Ok(measured.iter().zip(&through).map(|(m, t)| *m / *t).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn averages_repeated_sweeps() {
        let mut buf = CalibrationBuffer::new(2);
        assert!(buf.average().is_none());
        buf.add_sweep(&[c(1.0, 0.0), c(0.0, 2.0)]).unwrap();
        buf.add_sweep(&[c(3.0, 0.0), c(0.0, 4.0)]).unwrap();
        assert_eq!(buf.sweeps(), 2);
        assert_eq!(buf.average().unwrap(), vec![c(2.0, 0.0), c(0.0, 3.0)]);
        buf.clear();
        assert_eq!(buf.sweeps(), 0);
    }

    #[test]
    fn rejects_wrong_length() {
        let mut buf = CalibrationBuffer::new(3);
        assert!(matches!(
            buf.add_sweep(&[c(1.0, 0.0)]),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(buf.sweeps(), 0);
    }

    /// Apply a known error box to an actual reflection.
    fn error_box(gamma: Complex64) -> Complex64 {
        let e00 = c(0.05, -0.02);
        let e11 = c(0.1, 0.03);
        let tracking = c(0.8, 0.1);
        e00 + tracking * gamma / (1.0 - e11 * gamma)
    }

    #[test]
    fn short_open_load_recovers_reflection() {
        let mut cal = CalibrationSet::new(1);
        assert!(!cal.is_reflection_ready());
        cal.add_sweep(Standard::Short, &[error_box(c(-1.0, 0.0))]).unwrap();
        cal.add_sweep(Standard::Open, &[error_box(c(1.0, 0.0))]).unwrap();
        cal.add_sweep(Standard::Load, &[error_box(c(0.0, 0.0))]).unwrap();
        assert!(cal.is_reflection_ready());

        let actual = c(0.3, -0.4);
        let corrected = cal.correct_reflection(&[error_box(actual)]).unwrap();
        assert!((corrected[0] - actual).norm() < 1e-9);
    }

    #[test]
    fn reflection_needs_all_three_standards() {
        let mut cal = CalibrationSet::new(1);
        cal.add_sweep(Standard::Short, &[c(-1.0, 0.0)]).unwrap();
        assert!(cal.correct_reflection(&[c(0.0, 0.0)]).is_err());
    }

    #[test]
    fn through_normalizes_transmission() {
        let mut cal = CalibrationSet::new(2);
        cal.add_sweep(Standard::Through, &[c(0.5, 0.0), c(0.0, 0.5)])
            .unwrap();
        let out = cal
            .correct_transmission(&[c(0.25, 0.0), c(0.0, 0.5)])
            .unwrap();
        assert_eq!(out, vec![c(0.5, 0.0), c(1.0, 0.0)]);
        cal.clear(Standard::Through);
        assert!(cal.correct_transmission(&[c(0.0, 0.0); 2]).is_err());
    }
}
