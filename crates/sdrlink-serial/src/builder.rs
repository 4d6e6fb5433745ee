//! SerialLegacyBuilder -- constructs [`SerialLegacy`] drivers.
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_core::{DeviceConfig, HardwareDriver};
//! use sdrlink_serial::SerialLegacyBuilder;
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! let mut rx = SerialLegacyBuilder::new(DeviceConfig::serial_legacy("/dev/ttyUSB0"))
//!     .model_name("AR8600")
//!     .build()?;
//! rx.open().await?;
//! rx.set_frequency(None, 145_500_000);
//! # Ok(())
//! # }
//! ```

use sdrlink_core::config::DeviceConfig;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::key::KeyInput;
use sdrlink_core::transport::Transport;
use sdrlink_core::types::DeviceFamily;

use crate::rig::SerialLegacy;

/// Fluent builder for [`SerialLegacy`].
pub struct SerialLegacyBuilder {
    config: DeviceConfig,
    model_name: String,
    key_input: Option<Box<dyn KeyInput>>,
}

impl SerialLegacyBuilder {
    pub fn new(config: DeviceConfig) -> Self {
        SerialLegacyBuilder {
            config,
            model_name: "AR8600".to_string(),
            key_input: None,
        }
    }

    pub fn model_name(mut self, name: &str) -> Self {
        self.model_name = name.to_string();
        self
    }

    /// Read the key from `input` instead of the configured serial key line.
    pub fn key_input(mut self, input: Box<dyn KeyInput>) -> Self {
        self.key_input = Some(input);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.config.family != DeviceFamily::SerialLegacy {
            return Err(Error::InvalidParameter(format!(
                "serial builder given a {} configuration",
                self.config.family
            )));
        }
        Ok(())
    }

    /// Build a driver that sends its commands to `transport`.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<SerialLegacy> {
        self.validate()?;
        Ok(SerialLegacy::new(
            self.config,
            self.model_name,
            Some(transport),
            self.key_input,
        ))
    }

    /// Build a driver that opens its serial port in `open`.
    pub fn build(self) -> Result<SerialLegacy> {
        self.validate()?;
        if self.config.serial.is_none() {
            return Err(Error::InvalidParameter(
                "serial port is required for build()".into(),
            ));
        }
        Ok(SerialLegacy::new(
            self.config,
            self.model_name,
            None,
            self.key_input,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrlink_core::driver::HardwareDriver;
    use std::net::Ipv4Addr;

    #[test]
    fn defaults() {
        let rx = SerialLegacyBuilder::new(DeviceConfig::serial_legacy("COM3"))
            .build()
            .unwrap();
        assert_eq!(rx.info().model_name, "AR8600");
        assert_eq!(rx.info().family, DeviceFamily::SerialLegacy);
        assert!(!rx.is_open());
        assert!(rx.decimation_choices().is_empty());
    }

    #[test]
    fn rejects_network_config() {
        let result = SerialLegacyBuilder::new(DeviceConfig::uhf(Ipv4Addr::LOCALHOST)).build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn build_needs_port() {
        let mut config = DeviceConfig::serial_legacy("COM3");
        config.serial = None;
        assert!(SerialLegacyBuilder::new(config).build().is_err());
    }

    #[tokio::test]
    async fn missing_port_fails_open() {
        let mut rx = SerialLegacyBuilder::new(DeviceConfig::serial_legacy(
            "/dev/sdrlink-no-such-port",
        ))
        .build()
        .unwrap();
        assert!(rx.open().await.is_err());
        assert!(!rx.is_open());
        assert_eq!(rx.heartbeat().await, sdrlink_core::SyncState::Unknown);
    }
}
