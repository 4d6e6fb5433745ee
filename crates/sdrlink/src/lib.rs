//! # sdrlink -- control core for SDR front-ends
//!
//! `sdrlink` keeps the hardware of a software-defined radio in the state
//! the host application asks for. Networked front-ends echo a fixed-layout
//! status frame; the driver compares the echo with what it wants and
//! resends until they agree. Along the way it turns frequencies, sample
//! rates and sweep ranges into NCO phases, PLL registers and decimation
//! codes.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use sdrlink::{DeviceConfig, HardwareDriver, open_driver};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DeviceConfig::hiqsdr(Ipv4Addr::new(192, 168, 2, 196));
//!     let interval = config.heartbeat_interval;
//!     let mut driver = open_driver(config)?;
//!     println!("{}", driver.open().await?);
//!     driver.set_frequency(Some(7_100_000), 7_100_000);
//!
//!     let cancel = CancellationToken::new();
//!     sdrlink::run_heartbeat(driver.as_mut(), interval, cancel).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                           |
//! |------------------------|---------------------------------------------------|
//! | `sdrlink-core`         | [`HardwareDriver`], sync engine, NCO/PLL math, config |
//! | `sdrlink-transport`    | UDP, serial and key-line transports, SNDP         |
//! | `sdrlink-hiqsdr`       | HiQSDR driver                                     |
//! | `sdrlink-uhf`          | Dual-PLL UHF transceiver driver                   |
//! | `sdrlink-serial`       | Legacy ASCII serial receiver driver               |
//! | **`sdrlink`**          | This facade, plus the [`Generic`] driver          |
//!
//! ## Feature flags
//!
//! | Feature         | Enables                     | Default |
//! |-----------------|-----------------------------|---------|
//! | `hiqsdr`        | [`hiqsdr`] module           | yes     |
//! | `uhf`           | [`uhf`] module              | yes     |
//! | `serial-legacy` | [`serial`] module           | yes     |

mod generic;

pub use generic::Generic;
pub use sdrlink_core::*;

/// Transports and SNDP discovery.
pub mod transport {
    pub use sdrlink_transport::*;
}

/// HiQSDR backend.
///
/// Provides [`HiQsdr`](hiqsdr::HiQsdr) and
/// [`HiQsdrBuilder`](hiqsdr::HiQsdrBuilder), plus VNA calibration buffers.
#[cfg(feature = "hiqsdr")]
pub mod hiqsdr {
    pub use sdrlink_hiqsdr::*;
}

/// UHF transceiver backend.
#[cfg(feature = "uhf")]
pub mod uhf {
    pub use sdrlink_uhf::*;
}

/// Legacy serial receiver backend.
#[cfg(feature = "serial-legacy")]
pub mod serial {
    pub use sdrlink_serial::*;
}

/// Build the driver for `config.family` with default options.
///
/// No I/O happens here; call [`HardwareDriver::open`] on the result. A
/// family whose backend feature is disabled is reported as
/// [`Error::Unsupported`].
pub fn open_driver(config: DeviceConfig) -> Result<Box<dyn HardwareDriver>> {
    tracing::debug!(family = %config.family, "Building driver");
    match config.family {
        DeviceFamily::Generic => Ok(Box::new(Generic::new())),
        #[cfg(feature = "hiqsdr")]
        DeviceFamily::HiQsdr => Ok(Box::new(hiqsdr::HiQsdrBuilder::new(config).build()?)),
        #[cfg(feature = "uhf")]
        DeviceFamily::UhfTransceiver => Ok(Box::new(uhf::UhfBuilder::new(config).build()?)),
        #[cfg(feature = "serial-legacy")]
        DeviceFamily::SerialLegacy => {
            Ok(Box::new(serial::SerialLegacyBuilder::new(config).build()?))
        }
        #[allow(unreachable_patterns)]
        other => Err(Error::Unsupported(format!(
            "{other} support is not compiled in"
        ))),
    }
}

/// Device families whose backends are compiled in.
pub fn supported_families() -> Vec<DeviceFamily> {
    let mut families = vec![DeviceFamily::Generic];
    #[cfg(feature = "hiqsdr")]
    families.push(DeviceFamily::HiQsdr);
    #[cfg(feature = "uhf")]
    families.push(DeviceFamily::UhfTransceiver);
    #[cfg(feature = "serial-legacy")]
    families.push(DeviceFamily::SerialLegacy);
    families
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn dispatches_on_family() {
        let configs = [
            DeviceConfig::generic(),
            DeviceConfig::hiqsdr(Ipv4Addr::new(192, 168, 2, 196)),
            DeviceConfig::uhf(Ipv4Addr::new(192, 168, 1, 199)),
            DeviceConfig::serial_legacy("/dev/ttyUSB0"),
        ];
        for config in configs {
            let family = config.family;
            let driver = open_driver(config).unwrap();
            assert_eq!(driver.info().family, family);
            assert!(!driver.is_open());
        }
    }

    #[test]
    fn all_families_with_default_features() {
        assert_eq!(supported_families().len(), 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = DeviceConfig::hiqsdr(Ipv4Addr::LOCALHOST);
        config.network = None;
        assert!(open_driver(config).is_err());
    }

    #[tokio::test]
    async fn heartbeat_loop_closes_driver() {
        let mut driver = open_driver(DeviceConfig::generic()).unwrap();
        driver.open().await.unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        run_heartbeat(driver.as_mut(), std::time::Duration::from_millis(10), cancel)
            .await
            .unwrap();
        assert!(!driver.is_open());
    }
}
