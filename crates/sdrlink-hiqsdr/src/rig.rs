//! HiQsdr -- the [`HardwareDriver`] implementation for HiQSDR front-ends.
//!
//! Operator settings land in a [`HiqState`]; after every change the driver
//! rebuilds the status frame for the detected firmware and hands it to a
//! [`SyncEngine`], which moves it to the FPGA on the next heartbeat. The
//! only setter that bypasses the heartbeat is PTT, which is sent at once.
//!
//! While the destination of the sample stream is not yet configured on the
//! device, an [`SndpAgent`] answers its discovery broadcasts. It stops as
//! soon as the device answers the status handshake.
//!
//! External filter and control boxes are attached as [`Accessory`]
//! delegates and receive tuning and keying from the driver.

use std::net::{SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use tokio::sync::broadcast;

use sdrlink_core::accessory::Accessory;
use sdrlink_core::config::DeviceConfig;
use sdrlink_core::decimation::DecimationProfile;
use sdrlink_core::driver::HardwareDriver;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
use sdrlink_core::helpers::{format_freq_mhz, rate_label_ksps};
use sdrlink_core::sync::{SyncEngine, SyncState};
use sdrlink_core::transport::Transport;
use sdrlink_core::types::{DeviceFamily, DriverInfo, Mode, Tuning};
use sdrlink_core::vna::{SweepEndpoints, VnaSweepSpec, plan_sweep};
use sdrlink_transport::{SndpAgent, SndpSignature, SndpStop, UdpTransport};

use crate::codec::{HiqCodec, StatusFrame};
use crate::decimation::{self, DECIMATIONS, HiqDecimation};
use crate::state::{HiqState, RfGain, TxRate, sidetone_byte};

/// A HiQSDR front-end.
///
/// Constructed via [`HiQsdrBuilder`](crate::builder::HiQsdrBuilder).
pub struct HiQsdr {
    config: DeviceConfig,
    info: DriverInfo,
    state: HiqState,
    profile: DecimationProfile<HiqDecimation>,
    decimation_index: usize,
    engine: Option<SyncEngine<HiqCodec>>,
    sndp: Option<SndpAgent>,
    accessories: Vec<Box<dyn Accessory>>,
    /// Transport supplied at build time, consumed by `open`.
    injected: Option<Box<dyn Transport>>,
    event_tx: broadcast::Sender<DriverEvent>,
}

impl HiQsdr {
    pub(crate) fn new(
        config: DeviceConfig,
        accessories: Vec<Box<dyn Accessory>>,
        injected: Option<Box<dyn Transport>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let profile = decimation::profile(config.clock_hz);
        let decimation_index = decimation::initial_index(
            &profile,
            config.initial_sample_rate,
            config.initial_decimation,
        );
        let code = profile
            .get(decimation_index)
            .map(|c| c.code)
            .unwrap_or_else(|| HiqDecimation::new(DECIMATIONS[0]));
        let state = HiqState::new(&config, code);
        HiQsdr {
            info: DriverInfo {
                family: DeviceFamily::HiQsdr,
                model_name: "HiQSDR".to_string(),
            },
            config,
            state,
            profile,
            decimation_index,
            engine: None,
            sndp: None,
            accessories,
            injected,
            event_tx,
        }
    }

    /// Current wanted settings.
    pub fn state(&self) -> &HiqState {
        &self.state
    }

    /// The frame the engine is pushing, once open.
    pub fn wanted_frame(&self) -> Option<&StatusFrame> {
        self.engine.as_ref().map(|e| e.wanted())
    }

    /// The newest echo from the FPGA.
    pub fn observed_frame(&self) -> Option<&StatusFrame> {
        self.engine.as_ref().and_then(|e| e.observed())
    }

    fn rebuild(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            let frame = self.state.frame(engine.firmware_version());
            if engine.set_wanted(frame) {
                tracing::trace!(state = %engine.state(), "Wanted frame changed");
            }
        }
    }

    /// Select the receive RF gain step by selector index
    /// (see [`RfGain::LABELS`]).
    pub fn set_rf_gain(&mut self, index: usize) {
        self.state.rf_gain = RfGain::from_index(index);
        for acc in &mut self.accessories {
            acc.set_preamp(self.state.rf_gain == RfGain::Plus10);
        }
        self.rebuild();
    }

    /// Spot changes the mode bits as well as the spot flag.
    pub fn set_spot(&mut self, on: bool) {
        self.state.spot = on;
        self.rebuild();
    }

    /// Antenna 0 or 1.
    pub fn set_antenna(&mut self, antenna: usize) {
        self.state.antenna = antenna;
        self.rebuild();
    }

    pub fn set_full_duplex(&mut self, on: bool) {
        self.state.full_duplex = on;
        self.rebuild();
    }

    /// Sidetone volume from 0.0 to 1.0.
    pub fn set_sidetone(&mut self, volume: f64) {
        self.state.sidetone = sidetone_byte(volume);
        self.rebuild();
    }

    /// Voice and digital power as percentages of the band level.
    pub fn set_tx_power(&mut self, voice_pct: f64, digital_pct: f64) {
        self.state.voice_power_pct = voice_pct;
        self.state.digital_power_pct = digital_pct;
        self.rebuild();
    }

    pub fn set_tx_rate(&mut self, rate: TxRate) {
        self.state.tx_rate = rate;
        self.rebuild();
    }

    pub fn set_predistortion(&mut self, on: bool) {
        self.state.predistortion = on;
        self.rebuild();
    }

    pub fn set_noise_blanker(&mut self, level: u16) {
        self.state.noise_blanker = level;
        self.rebuild();
    }

    /// Shift the transmitter for repeater operation; 0 restores it.
    pub fn set_repeater_offset(&mut self, offset_khz: f64) {
        if self.state.repeater_offset(offset_khz) {
            let tx_hz = self.state.tx_hz;
            for acc in &mut self.accessories {
                acc.set_tx_freq(tx_hz);
            }
            self.rebuild();
        }
    }

    /// End a sweep and return to normal tuning.
    pub fn stop_vna(&mut self) {
        if self.state.vna.take().is_some() {
            tracing::debug!("VNA sweep stopped");
            self.rebuild();
        }
    }

    fn description(&self) -> String {
        let rate = self
            .profile
            .get(self.decimation_index)
            .map(|c| rate_label_ksps(c.rate_hz as f64))
            .unwrap_or_default();
        match &self.config.network {
            Some(net) => format!("HiQSDR at {}:{}, {rate} ksps", net.ip, net.control_port),
            None => format!("HiQSDR, {rate} ksps"),
        }
    }
}

#[async_trait]
impl HardwareDriver for HiQsdr {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    async fn open(&mut self) -> Result<String> {
        if self.is_open() {
            return Ok(self.description());
        }

        let transport: Box<dyn Transport> = match self.injected.take() {
            Some(t) => t,
            None => {
                let net = self.config.network.as_ref().ok_or_else(|| {
                    Error::InvalidParameter("HiQSDR needs a network address".into())
                })?;
                let device = SocketAddr::V4(SocketAddrV4::new(net.ip, net.control_port));
                let link = UdpTransport::open_control(device).await?;
                if net.sndp {
                    match SndpAgent::open(
                        net.ip,
                        net.netmask,
                        net.data_port,
                        SndpSignature::HiQsdr,
                        SndpStop::External,
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

        let wanted = self.state.frame(None);
        self.engine = Some(SyncEngine::new(
            HiqCodec,
            transport,
            wanted,
            self.event_tx.clone(),
        ));
        let description = self.description();
        tracing::info!(device = %description, "HiQSDR opened");
        Ok(description)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut engine) = self.engine.take() else {
            return Ok(());
        };
        self.sndp = None;
        self.state.ptt = false;
        self.state.vna = None;
        for acc in &mut self.accessories {
            acc.close().await;
        }
        let safe = engine.wanted().safe();
        let result = engine.close(safe).await;
        tracing::info!("HiQSDR closed");
        result
    }

    fn is_open(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| !e.is_closed())
    }

    fn set_frequency(&mut self, tx_hz: Option<i64>, vfo_hz: i64) -> Tuning {
        let before = self.state.tx_hz;
        let tuning = self.state.tune(tx_hz, vfo_hz);
        if tuning.tx_hz != before {
            for acc in &mut self.accessories {
                acc.set_tx_freq(tuning.tx_hz);
            }
        }
        tracing::debug!(
            vfo = %format_freq_mhz(tuning.vfo_actual_hz),
            tx_hz = tuning.tx_hz,
            "Retune"
        );
        self.rebuild();
        tuning
    }

    fn set_mode(&mut self, mode: Mode) {
        self.state.mode = Some(mode);
        self.rebuild();
    }

    fn set_band(&mut self, band: &str) {
        self.state.band = Some(band.to_string());
        self.state.band_bits = self.config.band_filter_for(band);
        self.state.band_tx_level = self.config.tx_level_for(band);
        let offset = self.config.transverter_offset_for(band);
        if offset != self.state.transverter_offset {
            self.state.transverter_offset = offset;
            self.state.retune();
        }
        self.rebuild();
    }

    async fn heartbeat(&mut self) -> SyncState {
        let Some(engine) = self.engine.as_mut() else {
            return SyncState::Unknown;
        };
        if let Some(agent) = self.sndp.as_mut() {
            agent.poll().await;
        }

        let tick = engine.heartbeat().await;
        if let Some(version) = tick.firmware_latched {
            if let Some(agent) = self.sndp.as_mut() {
                agent.deactivate();
            }
            // The handshake went out as a core frame; now send everything
            // this firmware understands.
            engine.set_wanted(self.state.frame(Some(version)));
        }

        for acc in &mut self.accessories {
            acc.heartbeat().await;
        }
        engine.state()
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
        let index = index.filter(|&i| i < self.profile.len()).unwrap_or_else(|| {
            decimation::initial_index(
                &self.profile,
                self.config.initial_sample_rate,
                self.config.initial_decimation,
            )
        });
        let Some(choice) = self.profile.get(index) else {
            return 0;
        };
        let rate = choice.rate_hz;
        self.state.decimation = choice.code;
        self.decimation_index = index;
        tracing::debug!(rate, decimation = choice.code.decimation, "Sample rate changed");
        self.rebuild();
        rate
    }

    fn decimation_index(&self) -> Option<usize> {
        Some(self.decimation_index)
    }

    fn select_decimation(&mut self, rate_hz: u32) -> Option<(usize, u32)> {
        let index = self.profile.select_index(rate_hz)?;
        Some((index, self.set_decimation(Some(index))))
    }

    fn decimation_range(&self) -> Option<(u32, u32)> {
        Some(decimation::RATE_RANGE)
    }

    fn set_vna(&mut self, spec: &VnaSweepSpec) -> Result<SweepEndpoints> {
        let plan = plan_sweep(spec, self.state.clock_hz)?;
        tracing::debug!(
            start = plan.endpoints.start_hz,
            stop = plan.endpoints.stop_hz,
            points = plan.points,
            "VNA sweep planned"
        );
        self.state.vna = Some(plan);
        self.rebuild();
        Ok(plan.endpoints)
    }

    async fn set_ptt(&mut self, on: bool) -> Result<()> {
        self.state.ptt = on;
        for acc in &mut self.accessories {
            acc.set_key_down(on);
        }
        self.rebuild();
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        if engine.firmware_version().is_some_and(|v| v > 0) {
            engine.send_now().await;
        } else {
            tracing::debug!("Software key needs firmware 1 or later; PTT held locally");
        }
        Ok(())
    }

    fn vfo_float(&self) -> Option<f64> {
        Some(self.state.vfo_actual_hz())
    }
}
