//! sdrlink-test-harness: mock transports and scripted inputs for testing
//! sdrlink drivers without hardware.
//!
//! [`MockTransport`] stands in for a front-end's UDP control socket or
//! serial port; [`ScriptedKey`] stands in for an external key line.

pub mod mock_transport;
pub mod scripted_key;

pub use mock_transport::{MockHandle, MockTransport};
pub use scripted_key::ScriptedKey;
