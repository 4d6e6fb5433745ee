//! sdrlink-core: Core traits, numeric synthesis, and the sync engine.
//!
//! This crate holds everything that is independent of a particular
//! front-end family: NCO and PLL arithmetic, the want/observed
//! [`SyncEngine`], the [`HardwareDriver`] trait every family implements,
//! and the immutable [`DeviceConfig`] drivers are built from.
//!
//! # Key types
//!
//! - [`HardwareDriver`] -- the unified driver interface
//! - [`SyncEngine`] / [`FrameCodec`] -- echo-based state reconciliation
//! - [`Transport`] -- datagram/command channel to a device
//! - [`DriverEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod accessory;
pub mod config;
pub mod decimation;
pub mod driver;
pub mod error;
pub mod events;
pub mod helpers;
pub mod key;
pub mod nco;
pub mod pll;
pub mod sync;
pub mod transport;
pub mod types;
pub mod vna;

#[cfg(test)]
mod test_link;

pub use accessory::{Accessory, ControlBox, FilterBox, GatewayPacer};
pub use config::{DeviceConfig, KeyLineConfig, NetworkConfig, SerialLink};
pub use decimation::{DecimationChoice, DecimationProfile};
pub use driver::{HardwareDriver, run_heartbeat};
pub use error::{Error, Result};
pub use events::DriverEvent;
pub use helpers::{format_freq_mhz, rate_label_ksps};
pub use key::{KeyInput, KeyModeFlags, KeyPoller, KeyState};
pub use nco::{NcoPhase, to_freq, to_phase};
pub use pll::{Ad9951Word, DividerOrder, PllRegisterSet, Synthesis};
pub use sync::{FrameCodec, SyncEngine, SyncState, Tick};
pub use transport::Transport;
pub use types::*;
pub use vna::{SweepEndpoints, SweepPlan, VnaSweepSpec};
