//! HiQSDR front-end backend for sdrlink.
//!
//! The HiQSDR is an FPGA receiver/exciter controlled by UDP status frames
//! that it echoes back. This crate provides:
//!
//! - **Status codec** ([`codec`]) -- the "St" frame, its firmware feature
//!   levels, and the "Qs" query reply.
//! - **Decimation table** ([`decimation`]) -- supported sample rates and
//!   their receive control codes.
//! - **Settings model** ([`state`]) -- operator settings and their
//!   translation into a status frame.
//! - **VNA calibration** ([`calibration`]) -- averaging buffers and
//!   short/open/load correction.
//! - **Driver** ([`rig`]) -- the [`HardwareDriver`](sdrlink_core::HardwareDriver)
//!   implementation, with SNDP and accessories.
//! - **Builder** ([`builder`]) -- fluent construction of [`HiQsdr`].
//!
//! # Example
//!
//! ```
//! use sdrlink_hiqsdr::codec::{self, StatusFrame};
//!
//! let frame = StatusFrame {
//!     rx_phase: 244_667_733,
//!     ..StatusFrame::default()
//! };
//! let bytes = codec::encode(&frame);
//! assert_eq!(bytes.len(), 14);
//! assert_eq!(&bytes[..2], b"St");
//! assert_eq!(codec::try_decode(&bytes), Some(frame));
//! ```

pub mod builder;
pub mod calibration;
pub mod codec;
pub mod decimation;
pub mod rig;
pub mod state;

pub use builder::HiQsdrBuilder;
pub use calibration::{CalibrationBuffer, CalibrationSet, Standard};
pub use codec::{HiqCodec, StatusFrame};
pub use rig::HiQsdr;
pub use state::{RfGain, TxRate};
