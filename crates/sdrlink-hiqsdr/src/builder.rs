//! HiQsdrBuilder -- fluent builder for constructing [`HiQsdr`] drivers.
//!
//! Building never touches the network: the control socket is opened by
//! [`HardwareDriver::open`](sdrlink_core::HardwareDriver::open). Accessories
//! are attached here and share one [`GatewayPacer`].
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_core::{DeviceConfig, HardwareDriver};
//! use sdrlink_hiqsdr::HiQsdrBuilder;
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! let config = DeviceConfig::hiqsdr(Ipv4Addr::new(192, 168, 2, 196))
//!     .with_initial_sample_rate(96_000);
//! let mut rig = HiQsdrBuilder::new(config).build()?;
//! println!("{}", rig.open().await?);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use sdrlink_core::accessory::{Accessory, ControlBox, FilterBox, GATEWAY_INTERVAL, GatewayPacer};
use sdrlink_core::config::DeviceConfig;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::Transport;
use sdrlink_core::types::DeviceFamily;

use crate::rig::HiQsdr;

/// Fluent builder for [`HiQsdr`].
pub struct HiQsdrBuilder {
    config: DeviceConfig,
    pacer: Option<Arc<GatewayPacer>>,
    control_box: Option<Box<dyn Transport>>,
    filter_box: Option<Box<dyn Transport>>,
    extra: Vec<Box<dyn Accessory>>,
}

impl HiQsdrBuilder {
    pub fn new(config: DeviceConfig) -> Self {
        HiQsdrBuilder {
            config,
            pacer: None,
            control_box: None,
            filter_box: None,
            extra: Vec::new(),
        }
    }

    /// Pace accessory commands with `pacer` instead of a private one.
    ///
    /// Passing the same pacer to several builders spaces commands across
    /// all of those devices.
    pub fn gateway_pacer(mut self, pacer: Arc<GatewayPacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Attach a control box reached through `transport`.
    pub fn control_box(mut self, transport: Box<dyn Transport>) -> Self {
        self.control_box = Some(transport);
        self
    }

    /// Attach a filter box reached through `transport`.
    pub fn filter_box(mut self, transport: Box<dyn Transport>) -> Self {
        self.filter_box = Some(transport);
        self
    }

    /// Attach any other accessory.
    pub fn accessory(mut self, accessory: Box<dyn Accessory>) -> Self {
        self.extra.push(accessory);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.config.family != DeviceFamily::HiQsdr {
            return Err(Error::InvalidParameter(format!(
                "HiQSDR builder given a {} configuration",
                self.config.family
            )));
        }
        if !(self.config.clock_hz.is_finite() && self.config.clock_hz > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "invalid sample clock {}",
                self.config.clock_hz
            )));
        }
        Ok(())
    }

    fn accessories(&mut self) -> Vec<Box<dyn Accessory>> {
        let pacer = self
            .pacer
            .take()
            .unwrap_or_else(|| GatewayPacer::new(GATEWAY_INTERVAL));
        let mut accessories: Vec<Box<dyn Accessory>> = Vec::new();
        if let Some(t) = self.control_box.take() {
            accessories.push(Box::new(ControlBox::new(t, pacer.clone())));
        }
        if let Some(t) = self.filter_box.take() {
            accessories.push(Box::new(FilterBox::new(t, pacer)));
        }
        accessories.append(&mut self.extra);
        accessories
    }

    /// Build a driver whose `open` talks to `transport` instead of opening
    /// a UDP socket. SNDP is not run.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `sdrlink-test-harness`).
    pub fn build_with_transport(mut self, transport: Box<dyn Transport>) -> Result<HiQsdr> {
        self.validate()?;
        let accessories = self.accessories();
        Ok(HiQsdr::new(self.config, accessories, Some(transport)))
    }

    /// Build a driver that opens its UDP control socket in `open`.
    ///
    /// Requires a network address in the configuration.
    pub fn build(mut self) -> Result<HiQsdr> {
        self.validate()?;
        if self.config.network.is_none() {
            return Err(Error::InvalidParameter(
                "network address is required for build()".into(),
            ));
        }
        let accessories = self.accessories();
        Ok(HiQsdr::new(self.config, accessories, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdrlink_core::driver::HardwareDriver;
    use sdrlink_core::types::Tuning;
    use sdrlink_test_harness::MockTransport;
    use std::net::Ipv4Addr;

    fn config() -> DeviceConfig {
        DeviceConfig::hiqsdr(Ipv4Addr::new(10, 0, 0, 5))
    }

    #[test]
    fn builder_defaults() {
        let rig = HiQsdrBuilder::new(config()).build().unwrap();
        assert_eq!(rig.info().model_name, "HiQSDR");
        assert_eq!(rig.info().family, DeviceFamily::HiQsdr);
        assert!(!rig.is_open());
    }

    #[test]
    fn rejects_other_families() {
        let result = HiQsdrBuilder::new(DeviceConfig::serial_legacy("/dev/ttyUSB0"))
            .build_with_transport(Box::new(MockTransport::new()));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn build_needs_network() {
        let mut cfg = config();
        cfg.network = None;
        assert!(HiQsdrBuilder::new(cfg).build().is_err());
    }

    #[test]
    fn initial_rate_from_config() {
        let rig = HiQsdrBuilder::new(config().with_initial_sample_rate(960_000))
            .build()
            .unwrap();
        assert_eq!(rig.decimation_index(), Some(6));
    }

    #[tokio::test]
    async fn accessories_follow_tuning_and_key() {
        let control = MockTransport::new();
        let control_handle = control.handle();
        control_handle.echo();
        let filter = MockTransport::new();
        let filter_handle = filter.handle();
        filter_handle.echo();

        // Zero spacing so both boxes can send in one tick.
        let mut rig = HiQsdrBuilder::new(config())
            .gateway_pacer(GatewayPacer::new(std::time::Duration::ZERO))
            .control_box(Box::new(control))
            .filter_box(Box::new(filter))
            .build_with_transport(Box::new(MockTransport::new()))
            .unwrap();
        rig.open().await.unwrap();

        let tuning: Tuning = rig.set_frequency(Some(7_100_000), 7_100_000);
        assert_eq!(tuning.tx_hz, 7_100_000);
        rig.set_ptt(true).await.unwrap();
        for _ in 0..4 {
            rig.heartbeat().await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert_eq!(control_handle.last_sent().unwrap(), b"C\x01".to_vec());
        // 7 MHz: low-pass index 4, high-pass index 1.
        assert_eq!(filter_handle.last_sent().unwrap(), vec![1 << 4, 1 << 1]);
    }
}
