//! Simple Network Discovery Protocol (SNDP).
//!
//! A front-end fresh from power-up may not know where to stream its
//! samples. SNDP lets the host find it by broadcast and push the
//! destination IP and port: the host broadcasts a fixed 56-byte request to
//! port 48321, the device answers with a 56-byte response carrying its
//! product signature, and the host replies with a "set" packet built from
//! that response.
//!
//! [`SndpAgent`] runs this exchange from the driver heartbeat until the
//! device is configured. [`discover`] performs a one-shot scan.

use sdrlink_core::error::{Error, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::udp::UdpTransport;

/// UDP port SNDP devices listen on.
pub const SNDP_PORT: u16 = 48321;

/// Length of every SNDP packet.
pub const SNDP_PACKET_LEN: usize = 56;

const SIGNATURE_OFFSET: usize = 5;
const REPORTED_IP_OFFSET: usize = 37;

/// Product signature a device reports in its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SndpSignature {
    HiQsdr,
    UhfReceiver,
}

impl SndpSignature {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            SndpSignature::HiQsdr => b"HiQSDR-v1",
            SndpSignature::UhfReceiver => b"QuiskUHFR-v1",
        }
    }

    /// Identify a response by its signature.
    pub fn detect(response: &[u8]) -> Option<Self> {
        [SndpSignature::HiQsdr, SndpSignature::UhfReceiver]
            .into_iter()
            .find(|sig| sig.matches(response))
    }

    pub fn matches(self, response: &[u8]) -> bool {
        let sig = self.as_bytes();
        response.len() == SNDP_PACKET_LEN
            && response[SIGNATURE_OFFSET..SIGNATURE_OFFSET + sig.len()] == *sig
    }
}

/// The broadcast discovery request.
pub fn request() -> [u8; SNDP_PACKET_LEN] {
    let mut packet = [0u8; SNDP_PACKET_LEN];
    packet[..4].copy_from_slice(&[SNDP_PACKET_LEN as u8, 0, 0x5A, 0xA5]);
    packet
}

/// Reply that sets the device's destination to `ip:port`.
///
/// Bytes 0..4 and 5..37 are copied from the response, byte 4 is the "set"
/// opcode, and the IP is written lowest octet first.
pub fn reply(response: &[u8; SNDP_PACKET_LEN], ip: Ipv4Addr, port: u16) -> [u8; SNDP_PACKET_LEN] {
    let mut packet = [0u8; SNDP_PACKET_LEN];
    packet[..4].copy_from_slice(&response[..4]);
    packet[4] = 2;
    packet[5..REPORTED_IP_OFFSET].copy_from_slice(&response[5..REPORTED_IP_OFFSET]);
    packet[REPORTED_IP_OFFSET..REPORTED_IP_OFFSET + 4].copy_from_slice(&reversed(ip));
    // 41..53 stay zero.
    packet[53..55].copy_from_slice(&port.to_le_bytes());
    packet
}

/// Whether the response shows the device already configured for `ip`.
pub fn reports_ip(response: &[u8], ip: Ipv4Addr) -> bool {
    response.len() == SNDP_PACKET_LEN
        && response[REPORTED_IP_OFFSET..REPORTED_IP_OFFSET + 4] == reversed(ip)
}

fn reversed(ip: Ipv4Addr) -> [u8; 4] {
    let mut octets = ip.octets();
    octets.reverse();
    octets
}

/// Subnet broadcast address: `ip | !netmask`.
pub fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// When the agent stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SndpStop {
    /// Only when the driver calls [`SndpAgent::deactivate`] (HiQSDR stops
    /// once firmware answers).
    External,
    /// As soon as a response reports the configured IP (UHF).
    IpReported,
}

/// What one [`SndpAgent::poll`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SndpPoll {
    pub responses: usize,
    pub replies: usize,
}

/// Heartbeat-driven SNDP exchange for one device.
pub struct SndpAgent {
    socket: UdpTransport,
    target: SocketAddr,
    signature: SndpSignature,
    stop: SndpStop,
    device_ip: Ipv4Addr,
    data_port: u16,
    active: bool,
}

impl SndpAgent {
    /// Bind a broadcast socket aimed at the subnet of `device_ip`.
    pub async fn open(
        device_ip: Ipv4Addr,
        netmask: Ipv4Addr,
        data_port: u16,
        signature: SndpSignature,
        stop: SndpStop,
    ) -> Result<Self> {
        let socket = UdpTransport::bind_port(0).await?;
        socket.set_broadcast(true)?;
        let target = SocketAddr::V4(SocketAddrV4::new(
            broadcast_address(device_ip, netmask),
            SNDP_PORT,
        ));
        tracing::debug!(target = %target, device = %device_ip, "SNDP agent started");
        Ok(Self::with_socket(socket, target, device_ip, data_port, signature, stop))
    }

    /// Use an already bound socket and explicit target.
    pub fn with_socket(
        socket: UdpTransport,
        target: SocketAddr,
        device_ip: Ipv4Addr,
        data_port: u16,
        signature: SndpSignature,
        stop: SndpStop,
    ) -> Self {
        SndpAgent {
            socket,
            target,
            signature,
            stop,
            device_ip,
            data_port,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        if self.active {
            tracing::debug!(device = %self.device_ip, "SNDP agent stopped");
            self.active = false;
        }
    }

    /// Answer pending responses, then broadcast a new request. Socket
    /// errors are logged and swallowed.
    pub async fn poll(&mut self) -> SndpPoll {
        let mut outcome = SndpPoll::default();
        if !self.active {
            return outcome;
        }

        let mut buf = [0u8; 1024];
        loop {
            let n = match self.socket.try_recv_from(&mut buf) {
                Ok(Some((n, _))) => n,
                Ok(None) => break,
                Err(e) => {
                    tracing::trace!(error = %e, "SNDP receive failed");
                    break;
                }
            };
            let Ok(response) = <&[u8; SNDP_PACKET_LEN]>::try_from(&buf[..n]) else {
                continue;
            };
            if !self.signature.matches(response) {
                continue;
            }
            outcome.responses += 1;
            if self.stop == SndpStop::IpReported && reports_ip(response, self.device_ip) {
                tracing::info!(device = %self.device_ip, "Device reports configured IP");
                self.deactivate();
                return outcome;
            }
            let packet = reply(response, self.device_ip, self.data_port);
            match self.socket.send_to(&packet, self.target).await {
                Ok(()) => outcome.replies += 1,
                Err(e) => tracing::trace!(error = %e, "SNDP reply failed"),
            }
        }

        if let Err(e) = self.socket.send_to(&request(), self.target).await {
            tracing::trace!(error = %e, "SNDP request failed");
        }
        outcome
    }
}

/// A device that answered a discovery broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    pub addr: SocketAddr,
    pub signature: SndpSignature,
    /// Destination IP the device currently streams to.
    pub configured_ip: Ipv4Addr,
}

/// Broadcast one request to `broadcast` and collect responses for `window`.
pub async fn discover(broadcast: Ipv4Addr, window: Duration) -> Result<Vec<Responder>> {
    let socket = UdpTransport::bind_port(0).await?;
    socket.set_broadcast(true)?;
    discover_on(&socket, SocketAddr::V4(SocketAddrV4::new(broadcast, SNDP_PORT)), window).await
}

pub(crate) async fn discover_on(
    socket: &UdpTransport,
    target: SocketAddr,
    window: Duration,
) -> Result<Vec<Responder>> {
    socket.send_to(&request(), target).await?;

    let deadline = tokio::time::Instant::now() + window;
    let mut found: Vec<Responder> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let (n, addr) = match socket.recv_from(&mut buf, remaining).await {
            Ok(received) => received,
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        };
        let response = &buf[..n];
        let Some(signature) = SndpSignature::detect(response) else {
            continue;
        };
        let mut ip = [0u8; 4];
        ip.copy_from_slice(&response[REPORTED_IP_OFFSET..REPORTED_IP_OFFSET + 4]);
        ip.reverse();
        if found.iter().all(|r| r.addr != addr) {
            tracing::debug!(addr = %addr, signature = ?signature, "SNDP responder");
            found.push(Responder {
                addr,
                signature,
                configured_ip: Ipv4Addr::from(ip),
            });
        }
    }
    Ok(found)
}
