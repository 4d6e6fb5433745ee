//! Legacy serial receiver backend for sdrlink.
//!
//! Receivers in this family (AR8600 and similar) take plain ASCII commands
//! terminated by a carriage return and give no usable echo. The driver
//! therefore paces commands instead of reconciling frames.
//!
//! - [`protocol`] -- command builders and the [`CommandPacer`]
//! - [`rig`] -- the [`HardwareDriver`](sdrlink_core::HardwareDriver) implementation
//! - [`builder`] -- construction

pub mod builder;
pub mod protocol;
pub mod rig;

pub use builder::SerialLegacyBuilder;
pub use protocol::CommandPacer;
pub use rig::SerialLegacy;
