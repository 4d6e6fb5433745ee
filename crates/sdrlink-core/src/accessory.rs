//! Station accessories driven by echo exchange.
//!
//! Filter boxes and control boxes sit behind a small UDP gateway. Like the
//! radio itself they echo every command they accept, so each accessory
//! keeps a wanted command and resends it until the echo matches. Resends
//! are paced by a [`GatewayPacer`]: the gateway cannot take commands faster
//! than one per 200 ms.
//!
//! Drivers hold accessories as `Box<dyn Accessory>` and forward tuning and
//! keying to them.
//!
//! A single pacer is shared by every accessory of a driver. Passing the
//! same `Arc<GatewayPacer>` to several drivers extends the spacing across
//! devices; nothing does that implicitly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::transport::Transport;

/// Minimum spacing between gateway commands.
pub const GATEWAY_INTERVAL: Duration = Duration::from_millis(200);

/// Resends before the accessory is reported as not answering.
pub const MAX_TRIES: u32 = 10;

/// Tuning changes smaller than this leave filters alone.
pub const RETUNE_THRESHOLD_HZ: i64 = 100_000;

/// Minimum-spacing gate for commands through a shared gateway.
#[derive(Debug)]
pub struct GatewayPacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl GatewayPacer {
    pub fn new(min_interval: Duration) -> Arc<Self> {
        Arc::new(GatewayPacer {
            min_interval,
            last: Mutex::new(None),
        })
    }

    /// Claim the gateway if the interval has elapsed since the last claim.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return false;
        };
        match *last {
            Some(t) if now.duration_since(t) <= self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// An accessory attached to a driver.
#[async_trait]
pub trait Accessory: Send {
    fn name(&self) -> &'static str;

    /// Transmit frequency changed.
    fn set_tx_freq(&mut self, _tx_hz: i64) {}

    fn set_key_down(&mut self, _down: bool) {}

    fn set_preamp(&mut self, _on: bool) {}

    /// Drain echoes and resend if needed.
    async fn heartbeat(&mut self);

    /// Leave the accessory in its safe state.
    async fn close(&mut self);

    /// Whether the last echo matches the wanted command.
    fn is_synced(&self) -> bool;
}

/// Want/have bookkeeping shared by the concrete accessories.
pub struct EchoLink {
    name: &'static str,
    transport: Box<dyn Transport>,
    pacer: Arc<GatewayPacer>,
    want: Vec<u8>,
    have: Option<Vec<u8>>,
    tries: u32,
}

impl EchoLink {
    pub fn new(
        name: &'static str,
        transport: Box<dyn Transport>,
        pacer: Arc<GatewayPacer>,
        initial: Vec<u8>,
    ) -> Self {
        EchoLink {
            name,
            transport,
            pacer,
            want: initial,
            have: None,
            tries: 0,
        }
    }

    pub fn want(&self) -> &[u8] {
        &self.want
    }

    pub fn is_synced(&self) -> bool {
        self.have.as_deref() == Some(self.want.as_slice())
    }

    /// Replace the wanted command; restarts the retry count.
    pub fn set_want(&mut self, want: Vec<u8>) {
        if want != self.want {
            self.want = want;
            self.tries = 0;
        }
    }

    pub async fn poll(&mut self, now: Instant) {
        let mut buf = [0u8; 64];
        while let Ok(Some(n)) = self.transport.try_receive(&mut buf).await {
            self.have = Some(buf[..n].to_vec());
        }
        if self.is_synced() || !self.pacer.try_acquire(now) {
            return;
        }
        if self.tries <= MAX_TRIES {
            self.tries += 1;
            if self.tries == MAX_TRIES {
                tracing::warn!(accessory = self.name, "Accessory is not answering");
            }
        }
        if let Err(e) = self.transport.send(&self.want).await {
            tracing::trace!(accessory = self.name, error = %e, "Accessory send failed");
        }
    }

    /// Send `safe` twice, 100 ms apart, unless the box already has it.
    pub async fn close_with(&mut self, safe: Vec<u8>) {
        self.want = safe;
        if !self.is_synced() {
            let _ = self.transport.send(&self.want).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = self.transport.send(&self.want).await;
        }
        let _ = self.transport.close().await;
    }
}

const CONTROL_KEY_UP: &[u8] = b"C\x00";
const CONTROL_KEY_DOWN: &[u8] = b"C\x01";

/// Station control box: keys the amplifier and sequencer.
pub struct ControlBox {
    link: EchoLink,
}

impl ControlBox {
    pub fn new(transport: Box<dyn Transport>, pacer: Arc<GatewayPacer>) -> Self {
        ControlBox {
            link: EchoLink::new("control box", transport, pacer, CONTROL_KEY_UP.to_vec()),
        }
    }

    pub fn want(&self) -> &[u8] {
        self.link.want()
    }
}

#[async_trait]
impl Accessory for ControlBox {
    fn name(&self) -> &'static str {
        "control box"
    }

    fn set_key_down(&mut self, down: bool) {
        let cmd = if down { CONTROL_KEY_DOWN } else { CONTROL_KEY_UP };
        self.link.set_want(cmd.to_vec());
    }

    async fn heartbeat(&mut self) {
        self.link.poll(Instant::now()).await;
    }

    async fn close(&mut self) {
        self.link.close_with(CONTROL_KEY_UP.to_vec()).await;
    }

    fn is_synced(&self) -> bool {
        self.link.is_synced()
    }
}

/// Low-pass filter index by whole MHz (0 through 25).
const LPF_BY_MHZ: [u8; 26] = [
    5, 5, 5, 5, 5, 5, 4, 4, 3, 3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 0, 0, 0, 0,
];
/// High-pass filter index by whole MHz.
const HPF_BY_MHZ: [u8; 26] = [
    2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];
const PREAMP_BIT: u8 = 0x80;

/// Two-byte filter box command for a transmit frequency: one-hot low-pass
/// and high-pass selections, preamp in the high-pass byte.
pub fn filter_command(tx_hz: i64, preamp: bool) -> [u8; 2] {
    let mhz = usize::try_from(tx_hz).ok().map(|hz| hz / 1_000_000);
    let lpf = mhz.and_then(|m| LPF_BY_MHZ.get(m)).copied().unwrap_or(0);
    let hpf = mhz.and_then(|m| HPF_BY_MHZ.get(m)).copied().unwrap_or(0);
    let mut hpf_bits = 1u8 << hpf;
    if preamp {
        hpf_bits |= PREAMP_BIT;
    }
    [1u8 << lpf, hpf_bits]
}

/// Band-switched low/high-pass filter box with a preamp.
pub struct FilterBox {
    link: EchoLink,
    preamp: bool,
    tx_hz: Option<i64>,
}

impl FilterBox {
    pub fn new(transport: Box<dyn Transport>, pacer: Arc<GatewayPacer>) -> Self {
        FilterBox {
            link: EchoLink::new("filter box", transport, pacer, vec![0, 0]),
            preamp: false,
            tx_hz: None,
        }
    }

    pub fn want(&self) -> &[u8] {
        self.link.want()
    }

    fn refresh(&mut self) {
        if let Some(tx_hz) = self.tx_hz {
            self.link.set_want(filter_command(tx_hz, self.preamp).to_vec());
        }
    }
}

#[async_trait]
impl Accessory for FilterBox {
    fn name(&self) -> &'static str {
        "filter box"
    }

    fn set_tx_freq(&mut self, tx_hz: i64) {
        if self
            .tx_hz
            .is_some_and(|old| (old - tx_hz).abs() < RETUNE_THRESHOLD_HZ)
        {
            return;
        }
        self.tx_hz = Some(tx_hz);
        self.refresh();
    }

    fn set_preamp(&mut self, on: bool) {
        self.preamp = on;
        self.refresh();
    }

    async fn heartbeat(&mut self) {
        self.link.poll(Instant::now()).await;
    }

    async fn close(&mut self) {
        let want = self.link.want().to_vec();
        self.link.close_with(want).await;
    }

    fn is_synced(&self) -> bool {
        self.link.is_synced()
    }
}
