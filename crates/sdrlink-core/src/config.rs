//! Immutable device configuration.
//!
//! A [`DeviceConfig`] is assembled once from a family preset plus `with_*`
//! overrides and then handed to a driver builder. Drivers keep their own
//! copy and never mutate it; operator changes at runtime go through driver
//! setters instead.
//!
//! ```
//! use sdrlink_core::DeviceConfig;
//! use std::net::Ipv4Addr;
//!
//! let config = DeviceConfig::hiqsdr(Ipv4Addr::new(192, 168, 2, 196))
//!     .with_band_filter("40", 0x03)
//!     .with_tx_level("40", 200)
//!     .with_transverter_offset("2", 116_000_000);
//! assert_eq!(config.tx_level_for("40"), 200);
//! assert_eq!(config.tx_level_for("20"), 127);
//! ```

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::driver::DEFAULT_HEARTBEAT_INTERVAL;
use crate::types::DeviceFamily;

/// HiQSDR sample clock: 122.88 MHz.
pub const HIQSDR_CLOCK_HZ: f64 = 122_880_000.0;
/// UHF board sample clock derived from its 38.879976 MHz reference.
pub const UHF_CLOCK_HZ: f64 = 38_879_976.0 * 32.0 / 2.0 / 9.0;
/// Rounded UHF clock used for rate labels and decimation arithmetic.
pub const UHF_NOMINAL_CLOCK_HZ: f64 = 69_120_000.0;
/// UHF receive synthesizer reference.
pub const UHF_SYNTH_REF_HZ: f64 = 38_879_976.0;
/// Nominal output of the DDS that serves as the transmit PLL reference.
pub const UHF_TX_SYNTH_REF_HZ: f64 = 10_700_000.0;
/// Clock of the transmit DDS.
pub const UHF_DDS_CLOCK_HZ: f64 = 80_000_014.0;
/// Default HiQSDR sample port; the control port is one above.
pub const HIQSDR_DATA_PORT: u16 = 48247;

/// Network endpoint of a UDP front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ip: Ipv4Addr,
    /// Control (status frame) port on the device.
    pub control_port: u16,
    /// Port the device streams samples to; pushed to it by SNDP.
    pub data_port: u16,
    pub netmask: Ipv4Addr,
    /// Run the SNDP discovery agent until the device is configured.
    pub sndp: bool,
}

/// Serial port settings for command links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialLink {
    pub port: String,
    pub baud_rate: u32,
}

/// External key line polled by a background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLineConfig {
    /// Serial port whose CTS line carries the key.
    pub port: String,
    pub poll_interval: Duration,
    /// How long transmit is held after a CW key release.
    pub hang_time: Duration,
    /// Consecutive identical samples required to accept a change.
    pub debounce_samples: u32,
}

impl KeyLineConfig {
    pub fn new(port: &str) -> Self {
        KeyLineConfig {
            port: port.to_string(),
            poll_interval: Duration::from_millis(5),
            hang_time: Duration::from_millis(700),
            debounce_samples: 2,
        }
    }
}

/// Configuration for one device, fixed for the life of the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub family: DeviceFamily,
    pub network: Option<NetworkConfig>,
    pub serial: Option<SerialLink>,
    /// Sample clock driving the NCOs.
    pub clock_hz: f64,
    /// Clock used for rate arithmetic and labels.
    pub nominal_clock_hz: f64,
    /// Receive PLL reference clock and R counter.
    pub synth_ref_hz: f64,
    pub synth_r_counter: u16,
    /// Transmit PLL nominal reference and R counter. The reference is a
    /// DDS that trims the transmit LO onto frequency.
    pub tx_synth_ref_hz: f64,
    pub tx_synth_r_counter: u16,
    pub dds_clock_hz: f64,
    /// Transmit DC offset correction (I, Q) per band, as fractions of full
    /// scale.
    pub tx_dc_corrections: HashMap<String, (f64, f64)>,
    /// Board carries the extended IO connector (HiQSDR with X1 header).
    pub extended_io: bool,
    pub default_tx_level: u8,
    pub tx_levels: HashMap<String, u8>,
    /// Preselector bits written to the connector byte per band.
    pub band_filters: HashMap<String, u8>,
    pub transverter_offsets: HashMap<String, i64>,
    pub cw_delay: u8,
    pub mic_boost: bool,
    pub initial_sample_rate: Option<u32>,
    pub initial_decimation: Option<u32>,
    pub key_line: Option<KeyLineConfig>,
    /// Minimum spacing of commands on legacy serial links.
    pub command_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl DeviceConfig {
    fn base(family: DeviceFamily) -> Self {
        DeviceConfig {
            family,
            network: None,
            serial: None,
            clock_hz: HIQSDR_CLOCK_HZ,
            nominal_clock_hz: HIQSDR_CLOCK_HZ,
            synth_ref_hz: UHF_SYNTH_REF_HZ,
            synth_r_counter: 8,
            tx_synth_ref_hz: UHF_TX_SYNTH_REF_HZ,
            tx_synth_r_counter: 2,
            dds_clock_hz: UHF_DDS_CLOCK_HZ,
            tx_dc_corrections: HashMap::new(),
            extended_io: false,
            default_tx_level: 127,
            tx_levels: HashMap::new(),
            band_filters: HashMap::new(),
            transverter_offsets: HashMap::new(),
            cw_delay: 0,
            mic_boost: false,
            initial_sample_rate: None,
            initial_decimation: None,
            key_line: None,
            command_interval: Duration::from_millis(20),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// A device with no hardware.
    pub fn generic() -> Self {
        Self::base(DeviceFamily::Generic)
    }

    /// HiQSDR at `ip` with the factory ports.
    pub fn hiqsdr(ip: Ipv4Addr) -> Self {
        let mut config = Self::base(DeviceFamily::HiQsdr);
        config.network = Some(NetworkConfig {
            ip,
            control_port: HIQSDR_DATA_PORT + 1,
            data_port: HIQSDR_DATA_PORT,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            sndp: true,
        });
        config.extended_io = true;
        config
    }

    /// UHF transceiver at `ip`.
    pub fn uhf(ip: Ipv4Addr) -> Self {
        let mut config = Self::base(DeviceFamily::UhfTransceiver);
        config.network = Some(NetworkConfig {
            ip,
            control_port: HIQSDR_DATA_PORT + 1,
            data_port: HIQSDR_DATA_PORT,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            sndp: true,
        });
        config.clock_hz = UHF_CLOCK_HZ;
        config.nominal_clock_hz = UHF_NOMINAL_CLOCK_HZ;
        config
    }

    /// ASCII command receiver on `port` (9600 baud).
    pub fn serial_legacy(port: &str) -> Self {
        let mut config = Self::base(DeviceFamily::SerialLegacy);
        config.serial = Some(SerialLink {
            port: port.to_string(),
            baud_rate: 9600,
        });
        config
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        if let Some(net) = self.network.as_mut() {
            net.netmask = netmask;
        }
        self
    }

    pub fn with_sndp(mut self, enabled: bool) -> Self {
        if let Some(net) = self.network.as_mut() {
            net.sndp = enabled;
        }
        self
    }

    pub fn with_serial(mut self, port: &str, baud_rate: u32) -> Self {
        self.serial = Some(SerialLink {
            port: port.to_string(),
            baud_rate,
        });
        self
    }

    pub fn with_clock(mut self, clock_hz: f64) -> Self {
        self.clock_hz = clock_hz;
        self.nominal_clock_hz = clock_hz;
        self
    }

    pub fn with_synth_reference(mut self, ref_hz: f64, r_counter: u16) -> Self {
        self.synth_ref_hz = ref_hz;
        self.synth_r_counter = r_counter;
        self
    }

    pub fn with_tx_synth_reference(
        mut self,
        ref_hz: f64,
        r_counter: u16,
        dds_clock_hz: f64,
    ) -> Self {
        self.tx_synth_ref_hz = ref_hz;
        self.tx_synth_r_counter = r_counter;
        self.dds_clock_hz = dds_clock_hz;
        self
    }

    pub fn with_tx_dc_correction(mut self, band: &str, i: f64, q: f64) -> Self {
        self.tx_dc_corrections.insert(band.to_string(), (i, q));
        self
    }

    pub fn with_extended_io(mut self, enabled: bool) -> Self {
        self.extended_io = enabled;
        self
    }

    pub fn with_default_tx_level(mut self, level: u8) -> Self {
        self.default_tx_level = level;
        self
    }

    pub fn with_tx_level(mut self, band: &str, level: u8) -> Self {
        self.tx_levels.insert(band.to_string(), level);
        self
    }

    pub fn with_band_filter(mut self, band: &str, bits: u8) -> Self {
        self.band_filters.insert(band.to_string(), bits);
        self
    }

    pub fn with_transverter_offset(mut self, band: &str, offset_hz: i64) -> Self {
        self.transverter_offsets.insert(band.to_string(), offset_hz);
        self
    }

    pub fn with_cw_delay(mut self, delay: u8) -> Self {
        self.cw_delay = delay;
        self
    }

    pub fn with_mic_boost(mut self, enabled: bool) -> Self {
        self.mic_boost = enabled;
        self
    }

    pub fn with_initial_sample_rate(mut self, rate: u32) -> Self {
        self.initial_sample_rate = Some(rate);
        self
    }

    pub fn with_initial_decimation(mut self, decimation: u32) -> Self {
        self.initial_decimation = Some(decimation);
        self
    }

    pub fn with_key_line(mut self, key_line: KeyLineConfig) -> Self {
        self.key_line = Some(key_line);
        self
    }

    pub fn with_command_interval(mut self, interval: Duration) -> Self {
        self.command_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Transmit level for `band`, falling back to the default.
    pub fn tx_level_for(&self, band: &str) -> u8 {
        self.tx_levels
            .get(band)
            .copied()
            .unwrap_or(self.default_tx_level)
    }

    pub fn band_filter_for(&self, band: &str) -> u8 {
        self.band_filters.get(band).copied().unwrap_or(0)
    }

    pub fn transverter_offset_for(&self, band: &str) -> i64 {
        self.transverter_offsets.get(band).copied().unwrap_or(0)
    }

    /// Transmit DC correction for `band`; none for unknown bands.
    pub fn tx_dc_correction_for(&self, band: &str) -> (f64, f64) {
        self.tx_dc_corrections
            .get(band)
            .copied()
            .unwrap_or((0.0, 0.0))
    }
}
