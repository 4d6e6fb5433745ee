//! Operator-facing HiQSDR settings and their translation into a status
//! frame.
//!
//! [`HiqState`] is the wanted hardware state in human units: frequencies,
//! mode, band, gains. [`HiqState::frame`] turns it into the
//! [`StatusFrame`] the sync engine sends. Keeping the two apart means a
//! setter never has to know which bits of which byte it touches, and the
//! frame is always rebuilt whole.

use sdrlink_core::DeviceConfig;
use sdrlink_core::nco::{to_freq, to_phase};
use sdrlink_core::types::{Mode, Tuning};
use sdrlink_core::vna::SweepPlan;

use crate::codec::{ANTENNA_2, PREDISTORTION, StatusFrame, connector, tx_control};
use crate::decimation::{HiqDecimation, VNA_RX_CONTROL};

/// Slope of the transmit DAC: output amplitude is `1 + 0.0326 * level`.
const TX_LEVEL_SLOPE: f64 = 0.0326;

/// Receive RF gain steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RfGain {
    #[default]
    Zero,
    /// Preamp on.
    Plus10,
    Minus10,
    Minus20,
    Minus30,
}

impl RfGain {
    pub const LABELS: [&'static str; 5] = ["RF 0 dB", "RF +10", "RF -10", "RF -20", "RF -30"];

    /// Gain for a selector index; unknown indices select 0 dB.
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => RfGain::Plus10,
            2 => RfGain::Minus10,
            3 => RfGain::Minus20,
            4 => RfGain::Minus30,
            _ => RfGain::Zero,
        }
    }

    pub fn db(self) -> i32 {
        match self {
            RfGain::Zero => 0,
            RfGain::Plus10 => 10,
            RfGain::Minus10 => -10,
            RfGain::Minus20 => -20,
            RfGain::Minus30 => -30,
        }
    }

    fn preamp(self) -> bool {
        self == RfGain::Plus10
    }

    fn attenuator(self) -> u8 {
        match self {
            RfGain::Minus10 => 0x08,
            RfGain::Minus20 => 0x10,
            RfGain::Minus30 => 0x18,
            _ => 0,
        }
    }
}

/// Transmit sample rate, bits 4-5 of the transmit control byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxRate {
    #[default]
    K48,
    K192,
    K480,
    K8,
}

impl TxRate {
    fn bits(self) -> u8 {
        let code = match self {
            TxRate::K48 => 0,
            TxRate::K192 => 1,
            TxRate::K480 => 2,
            TxRate::K8 => 3,
        };
        code << 4
    }
}

/// Scale a per-band transmit level by a power percentage.
///
/// The level sets an amplitude, so the percentage is applied through its
/// square root and the result converted back to a level.
pub fn scaled_tx_level(level: u8, power_pct: f64) -> u8 {
    let amplitude = (1.0 + TX_LEVEL_SLOPE * level as f64) * (power_pct.max(0.0) / 100.0).sqrt();
    ((amplitude - 1.0) / TX_LEVEL_SLOPE).round().clamp(0.0, 255.0) as u8
}

/// Sidetone volume byte for a 0.0-1.0 level.
pub fn sidetone_byte(volume: f64) -> u8 {
    (volume.clamp(0.0, 1.0) * 255.1) as u8
}

/// Wanted HiQSDR state.
#[derive(Debug, Clone)]
pub struct HiqState {
    pub clock_hz: f64,
    pub vfo_hz: i64,
    pub tx_hz: i64,
    pub transverter_offset: i64,
    rx_phase: u32,
    tx_phase: u32,
    pub mode: Option<Mode>,
    pub band: Option<String>,
    pub spot: bool,
    pub ptt: bool,
    /// Per-band level before power scaling.
    pub band_tx_level: u8,
    pub voice_power_pct: f64,
    pub digital_power_pct: f64,
    pub decimation: HiqDecimation,
    pub band_bits: u8,
    pub rf_gain: RfGain,
    pub full_duplex: bool,
    pub antenna: usize,
    pub sidetone: u8,
    pub cw_delay: u8,
    pub mic_boost: bool,
    pub predistortion: bool,
    pub noise_blanker: u16,
    pub tx_rate: TxRate,
    /// Board wired with the extended IO connector.
    pub extended_io: bool,
    pub vna: Option<SweepPlan>,
    /// Transmit frequency saved while a repeater offset is applied.
    pub repeater_saved: Option<i64>,
}

impl HiqState {
    pub fn new(config: &DeviceConfig, decimation: HiqDecimation) -> Self {
        HiqState {
            clock_hz: config.clock_hz,
            vfo_hz: 0,
            tx_hz: 0,
            transverter_offset: 0,
            rx_phase: 0,
            tx_phase: 0,
            mode: None,
            band: None,
            spot: false,
            ptt: false,
            band_tx_level: config.default_tx_level,
            voice_power_pct: 100.0,
            digital_power_pct: 100.0,
            decimation,
            band_bits: 0,
            rf_gain: RfGain::Zero,
            full_duplex: false,
            antenna: 0,
            sidetone: 0,
            cw_delay: config.cw_delay,
            mic_boost: config.mic_boost,
            predistortion: false,
            noise_blanker: 0,
            tx_rate: TxRate::K48,
            extended_io: config.extended_io,
            vna: None,
            repeater_saved: None,
        }
    }

    fn phase(&self, freq_hz: i64) -> u32 {
        to_phase((freq_hz - self.transverter_offset) as f64, self.clock_hz)
    }

    /// Retune. The receive phase is recomputed only when the VFO moves; a
    /// missing or non-positive transmit frequency leaves the transmitter
    /// where it is.
    pub fn tune(&mut self, tx_hz: Option<i64>, vfo_hz: i64) -> Tuning {
        if vfo_hz != self.vfo_hz {
            self.vfo_hz = vfo_hz;
            self.rx_phase = self.phase(vfo_hz);
        }
        if let Some(tx) = tx_hz.filter(|&t| t > 0) {
            self.tx_hz = tx;
            self.tx_phase = self.phase(tx);
        }
        Tuning {
            tx_hz: self.tx_hz,
            vfo_hz: self.vfo_hz,
            vfo_actual_hz: self.vfo_actual_hz(),
        }
    }

    /// Recompute both phases, e.g. after the transverter offset changed.
    pub fn retune(&mut self) {
        self.rx_phase = self.phase(self.vfo_hz);
        self.tx_phase = self.phase(self.tx_hz);
    }

    pub fn vfo_actual_hz(&self) -> f64 {
        to_freq(self.rx_phase, self.clock_hz) + self.transverter_offset as f64
    }

    /// Shift the transmitter by `offset_khz` for a repeater, or restore it
    /// with 0. Returns `false` when there was nothing to restore.
    pub fn repeater_offset(&mut self, offset_khz: f64) -> bool {
        if offset_khz == 0.0 {
            let Some(saved) = self.repeater_saved.take() else {
                return false;
            };
            self.tx_hz = saved;
        } else {
            if self.repeater_saved.is_none() {
                self.repeater_saved = Some(self.tx_hz);
            }
            let base = self.repeater_saved.unwrap_or(self.tx_hz);
            self.tx_hz = base + (offset_khz * 1000.0).round() as i64;
        }
        self.tx_phase = self.phase(self.tx_hz);
        true
    }

    /// Transmit level after power scaling, or full scale while sweeping.
    pub fn tx_level(&self) -> u8 {
        if self.vna.is_some() {
            return 255;
        }
        let pct = if self.mode.is_some_and(Mode::is_digital) {
            self.digital_power_pct
        } else {
            self.voice_power_pct
        };
        scaled_tx_level(self.band_tx_level, pct)
    }

    fn mode_bits(&self) -> u8 {
        if self.vna.is_some() {
            0
        } else if self.spot {
            tx_control::OTHER_MODES
        } else {
            match self.mode {
                Some(m) if m.is_cw() => tx_control::CW,
                Some(_) => tx_control::OTHER_MODES,
                None => 0,
            }
        }
    }

    /// Build the status frame for the current settings and firmware.
    ///
    /// The software key and extended IO need a firmware version above 0;
    /// fields the firmware does not understand are zeroed.
    pub fn frame(&self, firmware: Option<u8>) -> StatusFrame {
        let fw_known = firmware.is_some_and(|v| v > 0);

        let mut tx = self.mode_bits() | self.tx_rate.bits();
        if fw_known && self.extended_io {
            tx |= tx_control::EXTENDED_IO;
        }
        if fw_known && self.ptt {
            tx |= tx_control::KEY;
        }
        if self.spot {
            tx |= tx_control::SPOT;
        }
        if self.mic_boost {
            tx |= tx_control::MIC_BOOST;
        }

        let mut x1 = self.band_bits & connector::BAND_MASK;
        if self.rf_gain.preamp() {
            x1 |= connector::PREAMP;
        }
        if self.full_duplex {
            x1 |= connector::FULL_DUPLEX;
        }

        let (rx_phase, tx_phase, rx_control, vna_count) = match &self.vna {
            Some(plan) => (
                plan.start_phase.raw(),
                plan.delta_phase.raw(),
                VNA_RX_CONTROL,
                plan.points,
            ),
            None => (self.rx_phase, self.tx_phase, self.decimation.rx_control, 0),
        };

        StatusFrame {
            rx_phase,
            tx_phase,
            tx_level: self.tx_level(),
            tx_control: tx,
            rx_control,
            firmware: 0,
            connector_x1: x1,
            attenuator: self.rf_gain.attenuator(),
            io_bits: if self.antenna > 0 { ANTENNA_2 } else { 0 },
            sidetone: self.sidetone,
            vna_count,
            cw_delay: self.cw_delay,
            predistortion: if self.predistortion { PREDISTORTION } else { 0 },
            noise_blanker: self.noise_blanker,
        }
        .masked_for(firmware)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrlink_core::vna::{VnaSweepSpec, plan_sweep};
    use std::net::Ipv4Addr;

    fn state() -> HiqState {
        let config = DeviceConfig::hiqsdr(Ipv4Addr::new(192, 168, 2, 196));
        HiqState::new(&config, HiqDecimation::new(2560))
    }

    #[test]
    fn tx_level_scaling() {
        assert_eq!(scaled_tx_level(127, 100.0), 127);
        assert_eq!(scaled_tx_level(255, 100.0), 255);
        assert_eq!(scaled_tx_level(127, 0.0), 0);
        // Half power: (1 + 0.0326*200) * sqrt(0.5) = 5.317 -> level 132.
        assert_eq!(scaled_tx_level(200, 50.0), 132);
        assert_eq!(scaled_tx_level(200, 400.0), 255);
    }

    #[test]
    fn sidetone_scaling() {
        assert_eq!(sidetone_byte(0.0), 0);
        assert_eq!(sidetone_byte(0.5), 127);
        assert_eq!(sidetone_byte(1.0), 255);
        assert_eq!(sidetone_byte(3.0), 255);
    }

    #[test]
    fn mode_bits() {
        let mut s = state();
        assert_eq!(s.frame(Some(3)).tx_control & tx_control::MODE_MASK, 0);
        s.mode = Some(Mode::CWU);
        assert_eq!(s.frame(Some(3)).tx_control & tx_control::MODE_MASK, tx_control::CW);
        s.spot = true;
        let f = s.frame(Some(3));
        assert_eq!(f.tx_control & tx_control::MODE_MASK, tx_control::OTHER_MODES);
        assert_eq!(f.tx_control & tx_control::SPOT, tx_control::SPOT);
        s.spot = false;
        s.mode = Some(Mode::USB);
        assert_eq!(
            s.frame(Some(3)).tx_control & tx_control::MODE_MASK,
            tx_control::OTHER_MODES
        );
    }

    #[test]
    fn key_and_extended_io_need_firmware() {
        let mut s = state();
        s.ptt = true;
        let f = s.frame(None);
        assert_eq!(f.tx_control & (tx_control::KEY | tx_control::EXTENDED_IO), 0);
        let f = s.frame(Some(0));
        assert_eq!(f.tx_control & tx_control::KEY, 0);
        let f = s.frame(Some(1));
        assert_eq!(
            f.tx_control & (tx_control::KEY | tx_control::EXTENDED_IO),
            tx_control::KEY | tx_control::EXTENDED_IO
        );
    }

    #[test]
    fn rf_gain_bits() {
        let mut s = state();
        s.band_bits = 0x03;
        s.rf_gain = RfGain::Plus10;
        let f = s.frame(Some(3));
        assert_eq!(f.connector_x1, 0x13);
        assert_eq!(f.attenuator, 0);
        s.rf_gain = RfGain::from_index(4);
        let f = s.frame(Some(3));
        assert_eq!(f.connector_x1, 0x03);
        assert_eq!(f.attenuator, 0x18);
        assert_eq!(RfGain::from_index(9), RfGain::Zero);
    }

    #[test]
    fn transverter_offset_applies_to_both_phases() {
        let mut s = state();
        s.transverter_offset = 116_000_000;
        let t = s.tune(Some(144_200_000), 144_190_000);
        let f = s.frame(Some(3));
        assert_eq!(f.rx_phase, to_phase(28_190_000.0, s.clock_hz));
        assert_eq!(f.tx_phase, to_phase(28_200_000.0, s.clock_hz));
        assert!((t.vfo_actual_hz - 144_190_000.0).abs() < 0.03);
    }

    #[test]
    fn non_positive_tx_keeps_transmitter() {
        let mut s = state();
        s.tune(Some(7_010_000), 7_000_000);
        let t = s.tune(None, 7_100_000);
        assert_eq!(t.tx_hz, 7_010_000);
        let t = s.tune(Some(0), 7_100_000);
        assert_eq!(t.tx_hz, 7_010_000);
    }

    #[test]
    fn repeater_offset_shifts_and_restores() {
        let mut s = state();
        s.tune(Some(29_620_000), 29_620_000);
        let original = s.frame(Some(3)).tx_phase;
        assert!(s.repeater_offset(-100.0));
        assert_eq!(s.tx_hz, 29_520_000);
        assert_ne!(s.frame(Some(3)).tx_phase, original);
        assert!(s.repeater_offset(0.0));
        assert_eq!(s.tx_hz, 29_620_000);
        assert_eq!(s.frame(Some(3)).tx_phase, original);
        assert!(!s.repeater_offset(0.0));
    }

    #[test]
    fn sweep_overrides_tuning() {
        let mut s = state();
        s.mode = Some(Mode::USB);
        s.tune(Some(7_000_000), 7_000_000);
        let plan = plan_sweep(&VnaSweepSpec::new(0.0, 60e6, 4000).unwrap(), s.clock_hz).unwrap();
        s.vna = Some(plan);
        let f = s.frame(Some(3));
        assert_eq!(f.rx_phase, 0);
        assert_eq!(f.tx_phase, 524_419);
        assert_eq!(f.rx_control, 39);
        assert_eq!(f.tx_level, 255);
        assert_eq!(f.vna_count, 4000);
        assert_eq!(f.tx_control & tx_control::MODE_MASK, 0);
        // Old firmware cannot sweep.
        assert_eq!(s.frame(Some(2)).vna_count, 0);
    }

    #[test]
    fn digital_modes_use_digital_power() {
        let mut s = state();
        s.band_tx_level = 200;
        s.voice_power_pct = 100.0;
        s.digital_power_pct = 50.0;
        s.mode = Some(Mode::USB);
        assert_eq!(s.tx_level(), 200);
        s.mode = Some(Mode::DigitalU);
        assert_eq!(s.tx_level(), 132);
    }
}
