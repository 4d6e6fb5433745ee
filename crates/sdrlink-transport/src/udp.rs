//! UDP transport for networked front-ends.
//!
//! HiQSDR and the UHF transceiver take their status frames on a UDP control
//! port and echo every frame they accept. [`UdpTransport::open_control`]
//! binds an ephemeral local port and connects it to the device, so the
//! socket only sees datagrams from that device. Once connected it
//! implements [`Transport`], with a true non-blocking
//! [`try_receive`](Transport::try_receive) for the heartbeat drain.
//!
//! The same type, left unconnected with broadcast enabled, carries SNDP
//! discovery.
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_core::transport::Transport;
//! use sdrlink_transport::UdpTransport;
//! use std::net::{Ipv4Addr, SocketAddr};
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! let device = SocketAddr::from((Ipv4Addr::new(192, 168, 2, 196), 48248));
//! let mut link = UdpTransport::open_control(device).await?;
//! link.send(b"Qs").await?;
//!
//! let mut buf = [0u8; 256];
//! while let Some(n) = link.try_receive(&mut buf).await? {
//!     println!("echo: {:?}", &buf[..n]);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::Transport;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// UDP socket with the sdrlink error mapping.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    /// Remote end once [`connect`](Self::connect) has succeeded.
    peer: Option<SocketAddr>,
    closed: bool,
}

impl UdpTransport {
    /// Bind to a local address such as `"0.0.0.0:0"`.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self {
            socket,
            local_addr,
            peer: None,
            closed: false,
        })
    }

    /// Bind to `port` on all interfaces (0 for any free port).
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port)).await
    }

    /// Bind an ephemeral port and connect it to a device control port.
    pub async fn open_control(device: SocketAddr) -> Result<Self> {
        let transport = Self::bind_port(0).await?;
        let transport = transport.connect(device).await?;
        tracing::info!(
            local = %transport.local_addr,
            remote = %device,
            "UDP control link open"
        );
        Ok(transport)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The connected device, if any.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Connect to `addr`.
    ///
    /// UDP connect performs no handshake: it fixes the default destination
    /// and filters incoming datagrams to that source. A refused datagram
    /// later shows up as `ConnectionRefused` on the next receive.
    pub async fn connect(mut self, addr: SocketAddr) -> Result<Self> {
        self.socket.connect(addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to connect UDP socket"
            );
            Error::Io(e)
        })?;
        self.peer = Some(addr);
        Ok(self)
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::debug!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Receive one datagram, waiting up to `timeout`.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Receive one datagram if one is already queued.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Enable or disable sending to broadcast addresses.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        tracing::debug!(local = %self.local_addr, enable, "Setting broadcast");
        self.socket.set_broadcast(enable).map_err(|e| {
            tracing::error!(local = %self.local_addr, error = %e, "Failed to set broadcast");
            Error::Io(e)
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed || self.peer.is_none() {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.check_open()?;
        tracing::trace!(local = %self.local_addr, bytes = data.len(), "Sending datagram");
        self.socket.send(data).await.map_err(Error::Io)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.check_open()?;
        match tokio::time::timeout(timeout, self.socket.recv(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        self.check_open()?;
        match self.socket.try_recv(buf) {
            Ok(n) => {
                tracing::trace!(local = %self.local_addr, bytes = n, "Received datagram");
                Ok(Some(n))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            tracing::debug!(local = %self.local_addr, "Closing UDP link");
            self.closed = true;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.peer.is_some()
    }
}
