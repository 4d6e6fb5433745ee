//! Transport implementations for sdrlink.
//!
//! Concrete implementations of the [`Transport`](sdrlink_core::Transport)
//! trait from `sdrlink-core`:
//!
//! - [`UdpTransport`]: connected UDP control socket for HiQSDR and the UHF
//!   transceiver, also used unconnected for broadcast discovery
//! - [`SerialTransport`]: ASCII command port of legacy receivers
//!
//! Plus [`SerialKeyLine`], a serial status line read as an external key,
//! and the [`sndp`] discovery sub-protocol.

pub mod serial;
pub mod sndp;
pub mod udp;

pub use serial::{FlowControl, KeyLine, SerialConfig, SerialKeyLine, SerialTransport, StopBits};
pub use sndp::{SndpAgent, SndpSignature, SndpStop, discover};
pub use udp::UdpTransport;
