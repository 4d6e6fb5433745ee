//! Transport trait for front-end communication.
//!
//! The [`Transport`] trait abstracts over the raw link to a device: a
//! connected UDP control socket for networked receivers, or a serial port
//! for legacy front-ends. Each `send` is one datagram (or one command
//! string); framing and retry live in the layers above.
//!
//! The sync engine never blocks on a transport. It drains pending input with
//! [`Transport::try_receive`] until nothing is left, then sends at most one
//! frame. Tests substitute `MockTransport` from `sdrlink-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};

/// Asynchronous byte-level transport to a front-end.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram or command.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive into `buf`, waiting up to `timeout`.
    ///
    /// Returns the number of bytes read, or
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrived.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Non-blocking receive.
    ///
    /// Returns `Ok(None)` when no data is pending. The default polls
    /// [`receive`](Self::receive) with a zero timeout; socket-backed
    /// transports override it with a true non-blocking read.
    async fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.receive(buf, Duration::ZERO).await {
            Ok(n) => Ok(Some(n)),
            Err(Error::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Close the transport. Later calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently open.
    fn is_connected(&self) -> bool;
}
