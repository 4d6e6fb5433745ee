//! UhfTransceiver -- the [`HardwareDriver`] implementation for the
//! dual-channel UHF transceiver.
//!
//! The receive LO is an ADF4351 retuned only when the VFO leaves a
//! +/-3 MHz window around its output; inside the window the FPGA NCOs do
//! the fine tuning, relative to that LO. Channel 1 follows the VFO,
//! channel 0 watches the transmit frequency.
//!
//! The transmit LO is a second ADF4351 whose reference is an AD9951 DDS
//! near 10.7 MHz. Every transmit retune moves the DDS so the LO lands on
//! frequency; the PLL itself is only resynthesized when the DDS would
//! drift more than 15 kHz from its nominal output.
//!
//! Everything the device needs travels in one "Sx" frame, synthesizer
//! registers included. When a register block changes its dirty flag is
//! raised so the FPGA reloads the part, and lowered again once the device
//! has echoed the new registers.

use std::net::{SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use tokio::sync::broadcast;

use sdrlink_core::config::DeviceConfig;
use sdrlink_core::decimation::DecimationProfile;
use sdrlink_core::driver::HardwareDriver;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
use sdrlink_core::helpers::format_freq_mhz;
use sdrlink_core::nco::{to_freq, to_phase};
use sdrlink_core::pll::{self, Ad9951Word, Adf4351Fields, DividerOrder, Synthesis};
use sdrlink_core::sync::{SyncEngine, SyncState};
use sdrlink_core::transport::Transport;
use sdrlink_core::types::{DeviceFamily, DriverInfo, Mode, Tuning};
use sdrlink_transport::{SndpAgent, SndpSignature, SndpStop, UdpTransport};

use crate::codec::{UhfCodec, UhfFrame, flags};
use crate::decimation::{
    self, CH0_STAGES, RATE_RANGE, SCAN_BLOCK_RATE_HZ, SCAN_VALID_FRACTION, UhfRate,
};

/// Half-width of the band the receive LO covers without retuning.
pub const LO_WINDOW_HZ: f64 = 3e6;
/// How far the transmit DDS may move from its nominal output before the
/// transmit PLL is resynthesized.
pub const DDS_WINDOW_HZ: f64 = 15_000.0;
/// LO frequency at power-up.
pub const INITIAL_LO_HZ: f64 = 52e6;
/// Scan samples per block until the host says otherwise.
pub const DEFAULT_SCAN_SAMPLES: u16 = 1024;

/// Both ADF4351s run in integer mode with the auxiliary output off.
const LO_FIELDS: Adf4351Fields = Adf4351Fields {
    int_mode: true,
    modulus: 23,
    frac_value: 0,
    band_select_div: 40,
    aux_output: 0,
};

/// A dual-channel UHF transceiver.
///
/// Constructed via [`UhfBuilder`](crate::builder::UhfBuilder).
pub struct UhfTransceiver {
    config: DeviceConfig,
    info: DriverInfo,
    rx_lo: Synthesis,
    tx_lo: Synthesis,
    /// Current DDS word, absent if the last request did not fit.
    dds: Option<Ad9951Word>,
    dds_command: [u8; 6],
    vfo_hz: i64,
    tx_hz: i64,
    ch0_phase: u32,
    ch1_phase: u32,
    /// Channel 1 phase before the scan shift.
    vfo_phase: u32,
    profile: DecimationProfile<UhfRate>,
    decimation_index: usize,
    rate: UhfRate,
    scan_samples: u16,
    dirty: u8,
    ptt: bool,
    dc_i: f64,
    dc_q: f64,
    mode: Option<Mode>,
    band: Option<String>,
    engine: Option<SyncEngine<UhfCodec>>,
    sndp: Option<SndpAgent>,
    injected: Option<Box<dyn Transport>>,
    event_tx: broadcast::Sender<DriverEvent>,
}

impl UhfTransceiver {
    pub(crate) fn new(config: DeviceConfig, injected: Option<Box<dyn Transport>>) -> Result<Self> {
        let rx_lo = pll::synthesize(
            INITIAL_LO_HZ,
            config.synth_ref_hz,
            config.synth_r_counter,
            &LO_FIELDS,
            DividerOrder::Ascending,
        )?;
        let tx_lo = pll::synthesize(
            INITIAL_LO_HZ,
            config.tx_synth_ref_hz,
            config.tx_synth_r_counter,
            &LO_FIELDS,
            DividerOrder::Ascending,
        )?;
        let profile = decimation::profile(config.nominal_clock_hz);
        let decimation_index = decimation::initial_index(&profile, config.initial_sample_rate);
        let rate = profile
            .get(decimation_index)
            .map(|c| c.code)
            .unwrap_or(UhfRate::Fixed { stages: CH0_STAGES });
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut uhf = UhfTransceiver {
            info: DriverInfo {
                family: DeviceFamily::UhfTransceiver,
                model_name: "UHF transceiver".to_string(),
            },
            rx_lo,
            tx_lo,
            dds: None,
            dds_command: [0; 6],
            vfo_hz: INITIAL_LO_HZ as i64,
            tx_hz: 0,
            ch0_phase: 0,
            ch1_phase: 0,
            vfo_phase: 0,
            profile,
            decimation_index,
            rate,
            scan_samples: DEFAULT_SCAN_SAMPLES,
            dirty: flags::PLL0_CHANGED | flags::PLL1_CHANGED,
            ptt: false,
            dc_i: 0.0,
            dc_q: 0.0,
            mode: None,
            band: None,
            engine: None,
            sndp: None,
            injected,
            event_tx,
            config,
        };
        uhf.program_dds(INITIAL_LO_HZ);
        uhf.retune_channels();
        Ok(uhf)
    }

    fn clock_hz(&self) -> f64 {
        self.config.clock_hz
    }

    /// Receive LO output.
    pub fn rx_lo_hz(&self) -> f64 {
        self.rx_lo.actual_hz
    }

    /// Transmit LO output with the DDS reference applied.
    pub fn tx_lo_hz(&self) -> f64 {
        match self.dds {
            Some(word) => self
                .tx_lo
                .lo_for_reference(word.actual_hz, self.config.tx_synth_r_counter),
            None => self.tx_lo.actual_hz,
        }
    }

    /// Output of the transmit DDS.
    pub fn dds_hz(&self) -> Option<f64> {
        self.dds.map(|w| w.actual_hz)
    }

    pub fn dirty_flags(&self) -> u8 {
        self.dirty
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn band(&self) -> Option<&str> {
        self.band.as_deref()
    }

    pub fn wanted_frame(&self) -> Option<&UhfFrame> {
        self.engine.as_ref().map(|e| e.wanted())
    }

    pub fn observed_frame(&self) -> Option<&UhfFrame> {
        self.engine.as_ref().and_then(|e| e.observed())
    }

    fn synthesize(target_hz: f64, ref_hz: f64, r_counter: u16) -> Option<Synthesis> {
        match pll::synthesize(target_hz, ref_hz, r_counter, &LO_FIELDS, DividerOrder::Ascending) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, target_hz, "LO synthesis failed");
                None
            }
        }
    }

    /// Channel 1 offset from the receive LO, signed.
    fn vfo_offset_hz(&self) -> f64 {
        let clock = self.clock_hz();
        let f = to_freq(self.vfo_phase, clock);
        if self.vfo_phase >= 1 << 31 { f - clock } else { f }
    }

    fn outside_window(lo: &Synthesis, freq_hz: i64) -> bool {
        let f = freq_hz as f64;
        !(lo.actual_hz - LO_WINDOW_HZ < f && f < lo.actual_hz + LO_WINDOW_HZ)
    }

    /// Phase increment between adjacent scan blocks.
    fn scan_phase(&self) -> u32 {
        to_phase(SCAN_BLOCK_RATE_HZ as f64 * SCAN_VALID_FRACTION, self.clock_hz())
    }

    /// Recompute both channel phases against the current receive LO.
    fn retune_channels(&mut self) {
        let clock = self.clock_hz();
        self.vfo_phase = to_phase(self.vfo_hz as f64 - self.rx_lo.actual_hz, clock);
        let mut ch1 = self.vfo_phase;
        let blocks = self.rate.scan_blocks();
        if blocks > 1 {
            // Centre the scanned span on the VFO.
            let shift = (self.scan_phase() as f64 * (blocks as f64 - 1.0) / 2.0).round() as u32;
            ch1 = ch1.wrapping_sub(shift);
        }
        self.ch1_phase = ch1;
        self.ch0_phase = to_phase(self.tx_hz as f64 - self.rx_lo.actual_hz, clock);
    }

    /// DDS word that puts the current transmit PLL on `tx_hz`.
    fn dds_word(&self, tx_hz: f64) -> Option<Ad9951Word> {
        let reference = self
            .tx_lo
            .reference_for(tx_hz, self.config.tx_synth_r_counter)?;
        pll::ad9951_word(reference, self.config.dds_clock_hz)
    }

    fn program_dds(&mut self, tx_hz: f64) {
        self.dds = self.dds_word(tx_hz);
        let command = match self.dds {
            Some(word) => word.to_bytes(),
            None => {
                tracing::warn!(tx_hz, "Transmit DDS out of range");
                [0; 6]
            }
        };
        if command != self.dds_command {
            self.dds_command = command;
            self.dirty |= flags::DDS_CHANGED;
        }
    }

    /// Move the transmit chain to `tx_hz`: trim the DDS, resynthesizing the
    /// transmit PLL first if the DDS would leave its window.
    fn retune_tx(&mut self, tx_hz: f64) {
        let nominal = self.config.tx_synth_ref_hz;
        let drifted = self
            .dds_word(tx_hz)
            .is_none_or(|w| (w.actual_hz - nominal).abs() > DDS_WINDOW_HZ);
        if drifted {
            if let Some(lo) = Self::synthesize(tx_hz, nominal, self.config.tx_synth_r_counter) {
                tracing::debug!(lo = %format_freq_mhz(lo.actual_hz), "Transmit PLL retuned");
                self.tx_lo = lo;
                self.dirty |= flags::PLL1_CHANGED;
            }
        }
        self.program_dds(tx_hz);
    }

    /// Transmit DC offset correction, as fractions of full scale.
    pub fn set_dc_correction(&mut self, i: f64, q: f64) {
        self.dc_i = i;
        self.dc_q = q;
        self.rebuild();
    }

    /// Samples per scan block, usually the FFT size.
    pub fn set_scan_samples(&mut self, samples: u16) {
        self.scan_samples = samples.max(1);
        self.rebuild();
    }

    /// The frame for the current settings.
    pub fn frame(&self) -> UhfFrame {
        let mut frame_flags = flags::CH0_ENABLE | flags::CH1_ENABLE | self.dirty;
        let scan = self.rate.is_scan();
        if scan {
            frame_flags |= flags::SCAN_ENABLE;
        }
        if self.ptt {
            frame_flags |= flags::PTT;
        }
        if self.mode.is_some_and(Mode::is_cw) {
            frame_flags |= flags::MODE_CW;
        }
        UhfFrame {
            firmware: 0,
            ch0_decimation: CH0_STAGES,
            ch0_phase: self.ch0_phase,
            ch1_phase: self.ch1_phase,
            flags: frame_flags,
            scan_blocks: self.rate.scan_blocks(),
            scan_samples: if scan { self.scan_samples } else { 1 },
            scan_phase: if scan { self.scan_phase() } else { 0 },
            ch1_decimation: self.rate.stages(),
            pll0: self.rx_lo.registers,
            pll1: self.tx_lo.registers,
            dds_command: self.dds_command,
            dc_i: (self.dc_i * 32767.0) as i16,
            dc_q: (self.dc_q * 32767.0) as i16,
        }
    }

    fn rebuild(&mut self) {
        let frame = self.frame();
        if let Some(engine) = self.engine.as_mut() {
            engine.set_wanted(frame);
        }
    }
}

#[async_trait]
impl HardwareDriver for UhfTransceiver {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    async fn open(&mut self) -> Result<String> {
        let description = match &self.config.network {
            Some(net) => format!("UHF transceiver at {}:{}", net.ip, net.control_port),
            None => "UHF transceiver".to_string(),
        };
        if self.is_open() {
            return Ok(description);
        }

        let transport: Box<dyn Transport> = match self.injected.take() {
            Some(t) => t,
            None => {
                let net = self.config.network.as_ref().ok_or_else(|| {
                    Error::InvalidParameter("UHF transceiver needs a network address".into())
                })?;
                let device = SocketAddr::V4(SocketAddrV4::new(net.ip, net.control_port));
                let link = UdpTransport::open_control(device).await?;
                if net.sndp {
                    match SndpAgent::open(
                        net.ip,
                        net.netmask,
                        net.data_port,
                        SndpSignature::UhfReceiver,
                        SndpStop::IpReported,
                    )
                    .await
                    {
                        Ok(agent) => self.sndp = Some(agent),
                        Err(e) => tracing::warn!(error = %e, "SNDP unavailable"),
                    }
                }
                Box::new(link)
            }
        };

        self.engine = Some(SyncEngine::new(
            UhfCodec,
            transport,
            self.frame(),
            self.event_tx.clone(),
        ));
        tracing::info!(device = %description, "UHF transceiver opened");
        Ok(description)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut engine) = self.engine.take() else {
            return Ok(());
        };
        self.sndp = None;
        let safe = engine.wanted().safe();
        let result = engine.close(safe).await;
        tracing::info!("UHF transceiver closed");
        result
    }

    fn is_open(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| !e.is_closed())
    }

    fn set_frequency(&mut self, tx_hz: Option<i64>, vfo_hz: i64) -> Tuning {
        if let Some(tx) = tx_hz.filter(|&t| t > 0) {
            self.tx_hz = tx;
            self.retune_tx(tx as f64);
        }
        self.vfo_hz = vfo_hz;
        if Self::outside_window(&self.rx_lo, vfo_hz) {
            let (reference, r_counter) = (self.config.synth_ref_hz, self.config.synth_r_counter);
            if let Some(lo) = Self::synthesize(vfo_hz as f64, reference, r_counter) {
                tracing::debug!(lo = %format_freq_mhz(lo.actual_hz), "Receive LO retuned");
                self.rx_lo = lo;
                self.dirty |= flags::PLL0_CHANGED;
            }
        }
        self.retune_channels();
        self.rebuild();
        Tuning {
            tx_hz: self.tx_hz,
            vfo_hz: self.vfo_hz,
            vfo_actual_hz: self.rx_lo.actual_hz + self.vfo_offset_hz(),
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = Some(mode);
        self.rebuild();
    }

    /// Loads the band's transmit DC correction.
    fn set_band(&mut self, band: &str) {
        self.band = Some(band.to_string());
        let (i, q) = self.config.tx_dc_correction_for(band);
        self.set_dc_correction(i, q);
    }

    /// The key bit rides in the next frame; there is no immediate send.
    async fn set_ptt(&mut self, on: bool) -> Result<()> {
        self.ptt = on;
        self.rebuild();
        Ok(())
    }

    async fn heartbeat(&mut self) -> SyncState {
        let Some(engine) = self.engine.as_mut() else {
            return SyncState::Unknown;
        };
        if let Some(agent) = self.sndp.as_mut() {
            agent.poll().await;
            if !agent.is_active() {
                self.sndp = None;
            }
        }

        let tick = engine.heartbeat().await;
        if tick.firmware_latched.is_some() {
            self.sndp = None;
        }
        if engine.state() == SyncState::Synced && self.dirty != 0 {
            // The device has loaded the new registers.
            tracing::trace!(dirty = self.dirty, "Synthesizer updates confirmed");
            self.dirty = 0;
            let frame = self.frame();
            if let Some(engine) = self.engine.as_mut() {
                engine.set_wanted(frame);
            }
        }
        self.sync_state()
    }

    fn sync_state(&self) -> SyncState {
        self.engine
            .as_ref()
            .map(|e| e.state())
            .unwrap_or(SyncState::Unknown)
    }

    fn firmware_version(&self) -> Option<u8> {
        self.engine.as_ref().and_then(|e| e.firmware_version())
    }

    fn status_text(&self) -> Option<String> {
        self.engine
            .as_ref()
            .and_then(|e| e.status_text())
            .map(str::to_string)
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.event_tx.subscribe()
    }

    fn decimation_choices(&self) -> Vec<String> {
        self.profile.labels()
    }

    fn set_decimation(&mut self, index: Option<usize>) -> u32 {
        let index = index
            .filter(|&i| i < self.profile.len())
            .unwrap_or_else(|| decimation::initial_index(&self.profile, self.config.initial_sample_rate));
        let Some(choice) = self.profile.get(index) else {
            return 0;
        };
        let rate_hz = choice.rate_hz;
        self.rate = choice.code;
        self.decimation_index = index;
        tracing::debug!(rate_hz, label = %choice.label, "Sample rate changed");
        self.retune_channels();
        self.rebuild();
        rate_hz
    }

    fn decimation_index(&self) -> Option<usize> {
        Some(self.decimation_index)
    }

    fn select_decimation(&mut self, rate_hz: u32) -> Option<(usize, u32)> {
        let index = self.profile.select_index(rate_hz)?;
        Some((index, self.set_decimation(Some(index))))
    }

    fn decimation_range(&self) -> Option<(u32, u32)> {
        Some(RATE_RANGE)
    }

    fn vfo_float(&self) -> Option<f64> {
        Some(self.rx_lo.actual_hz + self.vfo_offset_hz())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UhfBuilder;
    use crate::codec;
    use sdrlink_core::nco::quantum;
    use sdrlink_test_harness::{MockHandle, MockTransport};
    use std::net::Ipv4Addr;

    fn config() -> DeviceConfig {
        DeviceConfig::uhf(Ipv4Addr::new(192, 168, 1, 199))
            .with_initial_sample_rate(96_000)
            .with_tx_dc_correction("70cm", 0.004495, 0.096879)
    }

    fn emulate_firmware(handle: &MockHandle, version: u8) {
        handle.set_responder(move |data| {
            let mut reply = data.to_vec();
            if reply.len() == codec::FRAME_LEN {
                reply[2] = version;
            }
            Some(reply)
        });
    }

    async fn open_rig() -> (UhfTransceiver, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        emulate_firmware(&handle, 5);
        let mut rig = UhfBuilder::new(config())
            .build_with_transport(Box::new(mock))
            .unwrap();
        rig.open().await.unwrap();
        (rig, handle)
    }

    async fn run_until_synced(rig: &mut UhfTransceiver, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if rig.heartbeat().await == SyncState::Synced && rig.dirty_flags() == 0 {
                return true;
            }
        }
        false
    }

    #[tokio::test]
    async fn handshake_latches_version_and_clears_dirty() {
        let (mut rig, handle) = open_rig().await;
        // Both channels on, both PLLs and the DDS loaded.
        assert_eq!(handle.sent_data()[0][26], 0x3B);

        assert!(run_until_synced(&mut rig, 10).await);
        assert_eq!(rig.firmware_version(), Some(5));
        let last = codec::try_decode(&handle.last_sent().unwrap()).unwrap();
        assert_eq!(last.flags & flags::DIRTY_MASK, 0);
        assert_eq!(last.flags, flags::CH0_ENABLE | flags::CH1_ENABLE);
    }

    #[tokio::test]
    async fn small_retune_stays_inside_lo_window() {
        let (mut rig, handle) = open_rig().await;
        assert!(run_until_synced(&mut rig, 10).await);
        let lo = rig.rx_lo_hz();

        let tuning = rig.set_frequency(None, 53_000_000);
        assert_eq!(rig.rx_lo_hz(), lo);
        assert_eq!(rig.dirty_flags(), 0);
        assert!((tuning.vfo_actual_hz - 53_000_000.0).abs() <= quantum(rig.clock_hz()));

        assert!(run_until_synced(&mut rig, 10).await);
        let sent = codec::try_decode(&handle.last_sent().unwrap()).unwrap();
        assert_eq!(sent.ch1_phase, to_phase(53_000_000.0 - lo, rig.clock_hz()));
    }

    #[tokio::test]
    async fn large_retune_reprograms_receive_pll() {
        let (mut rig, handle) = open_rig().await;
        assert!(run_until_synced(&mut rig, 10).await);
        let old_regs = rig.wanted_frame().unwrap().pll0;

        let tuning = rig.set_frequency(None, 146_520_000);
        assert!((rig.rx_lo_hz() - 146_520_000.0).abs() < LO_WINDOW_HZ);
        assert_eq!(rig.dirty_flags(), flags::PLL0_CHANGED);
        assert!((tuning.vfo_actual_hz - 146_520_000.0).abs() < 1.0);

        let wanted = *rig.wanted_frame().unwrap();
        assert_ne!(wanted.pll0, old_regs);
        assert!(run_until_synced(&mut rig, 10).await);
        let sent: Vec<_> = handle
            .sent_data()
            .iter()
            .filter_map(|d| codec::try_decode(d))
            .collect();
        assert!(sent.iter().any(|f| f.pll0 == wanted.pll0 && f.flags & flags::PLL0_CHANGED != 0));
    }

    #[tokio::test]
    async fn transmit_chain_trims_dds() {
        let (mut rig, _handle) = open_rig().await;
        assert!(run_until_synced(&mut rig, 10).await);

        // Far from the power-up LO: the transmit PLL is resynthesized.
        rig.set_frequency(Some(432_100_000), 432_100_000);
        assert_eq!(
            rig.dirty_flags() & (flags::PLL1_CHANGED | flags::DDS_CHANGED),
            flags::PLL1_CHANGED | flags::DDS_CHANGED
        );
        assert!((rig.tx_lo_hz() - 432_100_000.0).abs() < 1.0);
        let dds = rig.dds_hz().unwrap();
        assert!((dds - 10_700_000.0).abs() <= DDS_WINDOW_HZ);
        let command = rig.frame().dds_command;
        assert_eq!((command[0], command[5]), (40, 4));
        let pll1 = rig.frame().pll1;
        assert!(run_until_synced(&mut rig, 10).await);

        // 100 kHz up: only the DDS moves.
        rig.set_frequency(Some(432_200_000), 432_100_000);
        assert_eq!(rig.dirty_flags(), flags::DDS_CHANGED);
        assert_eq!(rig.frame().pll1, pll1);
        assert!((rig.tx_lo_hz() - 432_200_000.0).abs() < 1.0);
        assert!(rig.dds_hz().unwrap() > dds);
        assert!(run_until_synced(&mut rig, 10).await);

        // 8 MHz up pushes the DDS out of its window.
        rig.set_frequency(Some(440_000_000), 432_100_000);
        assert_ne!(rig.dirty_flags() & flags::PLL1_CHANGED, 0);
        assert_ne!(rig.frame().pll1, pll1);
        assert!((rig.dds_hz().unwrap() - 10_700_000.0).abs() <= DDS_WINDOW_HZ);
    }

    #[tokio::test]
    async fn mode_and_ptt_flags() {
        let (mut rig, _handle) = open_rig().await;
        assert!(run_until_synced(&mut rig, 10).await);

        rig.set_mode(Mode::CWU);
        assert_eq!(rig.wanted_frame().unwrap().flags & flags::MODE_CW, flags::MODE_CW);
        assert_eq!(rig.sync_state(), SyncState::Diverged);
        rig.set_mode(Mode::USB);
        assert_eq!(rig.wanted_frame().unwrap().flags & flags::MODE_CW, 0);

        rig.set_ptt(true).await.unwrap();
        assert_eq!(rig.wanted_frame().unwrap().flags & flags::PTT, flags::PTT);
        assert!(run_until_synced(&mut rig, 10).await);
        rig.set_ptt(false).await.unwrap();
        assert_eq!(rig.wanted_frame().unwrap().flags & flags::PTT, 0);
    }

    #[tokio::test]
    async fn band_loads_dc_correction() {
        let (mut rig, _handle) = open_rig().await;
        rig.set_band("70cm");
        let bytes = codec::encode(rig.wanted_frame().unwrap());
        assert_eq!(&bytes[90..92], &147i16.to_le_bytes());
        assert_eq!(&bytes[92..94], &3174i16.to_le_bytes());

        rig.set_band("23cm");
        let frame = rig.wanted_frame().unwrap();
        assert_eq!((frame.dc_i, frame.dc_q), (0, 0));
        assert_eq!(rig.band(), Some("23cm"));
    }

    #[tokio::test]
    async fn scan_rate_shifts_channel_one() {
        let (mut rig, _handle) = open_rig().await;
        rig.set_frequency(None, 52_500_000);
        let plain = rig.frame().ch1_phase;

        // Index 8 is "3X".
        assert_eq!(rig.decimation_choices()[8], "3X");
        assert_eq!(rig.set_decimation(Some(8)), 3 * 1_152_000);
        let frame = rig.frame();
        assert_eq!(frame.flags & flags::SCAN_ENABLE, flags::SCAN_ENABLE);
        assert_eq!(frame.scan_blocks, 3);
        assert_eq!(frame.scan_samples, DEFAULT_SCAN_SAMPLES);
        assert_eq!(frame.ch1_decimation, codec::Stages::new(2, 3));
        assert_eq!(plain.wrapping_sub(frame.ch1_phase), frame.scan_phase);

        assert_eq!(rig.set_decimation(Some(1)), 96_000);
        assert_eq!(rig.frame().ch1_phase, plain);
        assert_eq!(rig.frame().flags & flags::SCAN_ENABLE, 0);
    }

    #[tokio::test]
    async fn select_decimation_picks_nearest_rate() {
        let (mut rig, _handle) = open_rig().await;
        assert_eq!(rig.select_decimation(100_000), Some((1, 96_000)));
        assert_eq!(rig.decimation_index(), Some(1));
        assert_eq!(rig.select_decimation(700_000), Some((4, 768_000)));
        assert_eq!(rig.frame().ch1_decimation, codec::Stages::new(3, 3));
    }

    #[tokio::test]
    async fn close_stops_streaming_and_unkeys() {
        let (mut rig, handle) = open_rig().await;
        run_until_synced(&mut rig, 10).await;
        rig.set_ptt(true).await.unwrap();
        rig.close().await.unwrap();
        let last = codec::try_decode(&handle.last_sent().unwrap()).unwrap();
        assert_eq!(last.flags, 0);
        assert!(!rig.is_open());
        assert_eq!(rig.heartbeat().await, SyncState::Unknown);
    }

    #[tokio::test]
    async fn rate_range_and_default_rate() {
        let rig = UhfBuilder::new(DeviceConfig::uhf(Ipv4Addr::LOCALHOST))
            .build_with_transport(Box::new(MockTransport::new()))
            .unwrap();
        assert_eq!(rig.decimation_range(), Some((48_000, 1_152_000)));
        assert_eq!(rig.decimation_index(), Some(2));
        assert_eq!(rig.frame().dds_command[0], 40);
        assert_ne!(rig.dirty_flags() & flags::DDS_CHANGED, 0);
    }
}
