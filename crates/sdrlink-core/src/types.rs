//! Shared types used across sdrlink drivers.

use std::fmt;
use std::str::FromStr;

/// Device family a driver speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFamily {
    /// No hardware; tuning requests are accepted as given.
    Generic,
    /// HiQSDR and compatible UDP front-ends ("St" status frames).
    HiQsdr,
    /// Dual-channel UHF transceiver with two on-board PLLs ("Sx" frames).
    UhfTransceiver,
    /// ASCII command receiver on a serial port.
    SerialLegacy,
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceFamily::Generic => "generic",
            DeviceFamily::HiQsdr => "hiqsdr",
            DeviceFamily::UhfTransceiver => "uhf",
            DeviceFamily::SerialLegacy => "serial-legacy",
        };
        write!(f, "{s}")
    }
}

/// Static information about a driver instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub family: DeviceFamily,
    /// Human-readable model name, e.g. "HiQSDR" or "AR8600".
    pub model_name: String,
}

/// Demodulation mode as selected by the operator.
///
/// Drivers only care about the distinction between CW, digital, and
/// everything else, but the full set is kept so callers can pass their mode
/// straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    CWL,
    CWU,
    LSB,
    USB,
    AM,
    FM,
    DigitalU,
    DigitalL,
    DigitalIQ,
    DigitalFM,
    FreeDvU,
    FreeDvL,
    Imd,
    Ext,
}

impl Mode {
    pub fn is_cw(self) -> bool {
        matches!(self, Mode::CWL | Mode::CWU)
    }

    /// Digital voice and data modes, which use the digital tx power level.
    pub fn is_digital(self) -> bool {
        matches!(
            self,
            Mode::DigitalU
                | Mode::DigitalL
                | Mode::DigitalIQ
                | Mode::DigitalFM
                | Mode::FreeDvU
                | Mode::FreeDvL
        )
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::CWL => "CWL",
            Mode::CWU => "CWU",
            Mode::LSB => "LSB",
            Mode::USB => "USB",
            Mode::AM => "AM",
            Mode::FM => "FM",
            Mode::DigitalU => "DGT-U",
            Mode::DigitalL => "DGT-L",
            Mode::DigitalIQ => "DGT-IQ",
            Mode::DigitalFM => "DGT-FM",
            Mode::FreeDvU => "FDV-U",
            Mode::FreeDvL => "FDV-L",
            Mode::Imd => "IMD",
            Mode::Ext => "EXT",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseModeError(String);

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mode: {}", self.0)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CWL" => Ok(Mode::CWL),
            "CWU" | "CW" => Ok(Mode::CWU),
            "LSB" => Ok(Mode::LSB),
            "USB" => Ok(Mode::USB),
            "AM" => Ok(Mode::AM),
            "FM" => Ok(Mode::FM),
            "DGT-U" => Ok(Mode::DigitalU),
            "DGT-L" => Ok(Mode::DigitalL),
            "DGT-IQ" => Ok(Mode::DigitalIQ),
            "DGT-FM" => Ok(Mode::DigitalFM),
            "FDV-U" => Ok(Mode::FreeDvU),
            "FDV-L" => Ok(Mode::FreeDvL),
            "IMD" => Ok(Mode::Imd),
            "EXT" => Ok(Mode::Ext),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Tuning as applied by a driver.
///
/// Drivers may move the requested frequencies (rounding to a synthesizer
/// step, a legacy receiver's 10 kHz raster); callers must use these values
/// rather than their request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub tx_hz: i64,
    pub vfo_hz: i64,
    /// Exact tuned receive frequency, including NCO and LO rounding.
    pub vfo_actual_hz: f64,
}

impl Tuning {
    /// Tuning accepted exactly as requested.
    pub fn exact(tx_hz: i64, vfo_hz: i64) -> Self {
        Tuning {
            tx_hz,
            vfo_hz,
            vfo_actual_hz: vfo_hz as f64,
        }
    }
}
