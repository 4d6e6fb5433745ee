//! UhfBuilder -- constructs [`UhfTransceiver`] drivers.
//!
//! The initial LO registers and DDS word are computed here, so a bad
//! synthesizer reference is reported at build time rather than on the
//! first tune.

use sdrlink_core::config::DeviceConfig;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::Transport;
use sdrlink_core::types::DeviceFamily;

use crate::rig::UhfTransceiver;

pub struct UhfBuilder {
    config: DeviceConfig,
}

impl UhfBuilder {
    pub fn new(config: DeviceConfig) -> Self {
        UhfBuilder { config }
    }

    fn validate(&self) -> Result<()> {
        if self.config.family != DeviceFamily::UhfTransceiver {
            return Err(Error::InvalidParameter(format!(
                "UHF builder given a {} configuration",
                self.config.family
            )));
        }
        if !(self.config.clock_hz.is_finite() && self.config.clock_hz > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "invalid sample clock {}",
                self.config.clock_hz
            )));
        }
        if !(self.config.dds_clock_hz.is_finite() && self.config.dds_clock_hz > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "invalid DDS clock {}",
                self.config.dds_clock_hz
            )));
        }
        Ok(())
    }

    /// Build a driver that talks to `transport`. SNDP is not run.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<UhfTransceiver> {
        self.validate()?;
        UhfTransceiver::new(self.config, Some(transport))
    }

    /// Build a driver that opens its UDP control socket in `open`.
    pub fn build(self) -> Result<UhfTransceiver> {
        self.validate()?;
        if self.config.network.is_none() {
            return Err(Error::InvalidParameter(
                "network address is required for build()".into(),
            ));
        }
        UhfTransceiver::new(self.config, None)
    }
}
