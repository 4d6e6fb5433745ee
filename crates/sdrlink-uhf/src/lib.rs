//! UHF transceiver backend for sdrlink.
//!
//! A two-channel FPGA receiver with ADF4351 local oscillators for receive
//! and transmit, the transmit one referenced to an AD9951 DDS, all
//! programmed through one UDP status frame.
//!
//! - [`codec`] -- the 96-byte "Sx" frame
//! - [`decimation`] -- continuous and scan sample rates
//! - [`rig`] -- the [`HardwareDriver`](sdrlink_core::HardwareDriver) implementation
//! - [`builder`] -- construction and validation

pub mod builder;
pub mod codec;
pub mod decimation;
pub mod rig;

pub use builder::UhfBuilder;
pub use codec::{UhfCodec, UhfFrame};
pub use decimation::UhfRate;
pub use rig::UhfTransceiver;
