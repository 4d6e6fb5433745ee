//! Want/observed reconciliation engine.
//!
//! Networked front-ends echo every status frame they accept. The engine
//! keeps the frame the host *wants* the device to have, the most recent
//! frame the device *echoed*, and on each heartbeat tick:
//!
//! 1. drains every pending datagram without blocking, keeping the newest
//!    frame that decodes (foreign and malformed datagrams are dropped);
//! 2. until the firmware version is known, sends the wanted frame as a
//!    handshake and latches the version from the first echo whose
//!    invariant header matches;
//! 3. afterwards, resends the wanted frame every tick for as long as the
//!    echo differs from it.
//!
//! There is no other acknowledgement. Each frame carries the complete
//! device state, so resending is idempotent and the engine converges after
//! any single successful round trip regardless of loss or reordering.
//! Transport errors are logged and swallowed; a device that never answers
//! simply leaves the engine in [`SyncState::Probing`] or
//! [`SyncState::Diverged`].

use std::fmt;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::events::DriverEvent;
use crate::transport::Transport;

/// Status text shown while the device has not answered.
pub const NO_RESPONSE: &str = "no hardware response";

/// Link state of a sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Nothing sent or received yet.
    Unknown,
    /// Handshake frames sent, no matching echo yet.
    Probing,
    /// The last echo equals the wanted frame.
    Synced,
    /// The wanted frame changed, or the echo disagrees; resending.
    Diverged,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Unknown => "unknown",
            SyncState::Probing => "probing",
            SyncState::Synced => "synced",
            SyncState::Diverged => "diverged",
        };
        write!(f, "{s}")
    }
}

/// Encoding and comparison rules for one device family's status frame.
pub trait FrameCodec: Send + Sync {
    /// Decoded frame. Equality must cover every field the device echoes.
    type Frame: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Largest datagram the device sends.
    const MAX_FRAME_LEN: usize;

    fn encode(&self, frame: &Self::Frame) -> Vec<u8>;

    /// Decode a datagram, or `None` if it is not a status frame.
    fn try_decode(&self, buf: &[u8]) -> Option<Self::Frame>;

    /// Whether an echo answers the handshake: the invariant header of the
    /// handshake frame matches.
    fn handshake_matches(&self, wanted: &Self::Frame, observed: &Self::Frame) -> bool;

    /// Whether the device has converged on the wanted frame.
    fn converged(&self, wanted: &Self::Frame, observed: &Self::Frame) -> bool {
        wanted == observed
    }

    /// Firmware version reported in an echo.
    fn firmware_version(&self, observed: &Self::Frame) -> u8;
}

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub state: SyncState,
    /// Set on the tick the firmware version is first learned. The owner
    /// should rebuild its wanted frame for that firmware level.
    pub firmware_latched: Option<u8>,
    /// Whether the wanted frame was (re)sent this tick.
    pub sent: bool,
    /// Datagrams that decoded as status frames.
    pub received: usize,
    /// Datagrams dropped as foreign or malformed.
    pub dropped: usize,
}

/// Drives one device connection towards its wanted frame.
pub struct SyncEngine<C: FrameCodec> {
    codec: C,
    transport: Box<dyn Transport>,
    wanted: C::Frame,
    observed: Option<C::Frame>,
    state: SyncState,
    firmware: Option<u8>,
    status: Option<String>,
    recv_buf: Vec<u8>,
    event_tx: broadcast::Sender<DriverEvent>,
    closed: bool,
}

impl<C: FrameCodec> SyncEngine<C> {
    pub fn new(
        codec: C,
        transport: Box<dyn Transport>,
        wanted: C::Frame,
        event_tx: broadcast::Sender<DriverEvent>,
    ) -> Self {
        SyncEngine {
            codec,
            transport,
            wanted,
            observed: None,
            state: SyncState::Unknown,
            firmware: None,
            status: Some(NO_RESPONSE.to_string()),
            recv_buf: vec![0u8; C::MAX_FRAME_LEN.max(64) * 2],
            event_tx,
            closed: false,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn wanted(&self) -> &C::Frame {
        &self.wanted
    }

    /// The newest echo, absent until the device first answers.
    pub fn observed(&self) -> Option<&C::Frame> {
        self.observed.as_ref()
    }

    pub fn firmware_version(&self) -> Option<u8> {
        self.firmware
    }

    /// Sticky status text, set while no handshake echo has arrived.
    pub fn status_text(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Replace the wanted frame. Returns `true` if it changed.
    ///
    /// A change while synced moves the engine to `Diverged`; the next tick
    /// resends.
    pub fn set_wanted(&mut self, frame: C::Frame) -> bool {
        if frame == self.wanted {
            return false;
        }
        self.wanted = frame;
        if self.state == SyncState::Synced {
            self.transition(SyncState::Diverged);
        }
        true
    }

    /// Send the wanted frame immediately, outside the tick.
    ///
    /// Used for latency-sensitive changes such as keying the transmitter.
    /// Returns `false` if the send failed; the next tick retries.
    pub async fn send_now(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.send_wanted().await
    }

    /// Run one heartbeat tick.
    pub async fn heartbeat(&mut self) -> Tick {
        let mut tick = Tick {
            state: self.state,
            firmware_latched: None,
            sent: false,
            received: 0,
            dropped: 0,
        };
        if self.closed {
            return tick;
        }

        self.drain(&mut tick).await;

        match self.firmware {
            None => {
                let answered = self
                    .observed
                    .as_ref()
                    .filter(|obs| self.codec.handshake_matches(&self.wanted, obs))
                    .map(|obs| self.codec.firmware_version(obs));
                match answered {
                    Some(version) => {
                        tracing::info!(firmware = version, "Device answered handshake");
                        self.firmware = Some(version);
                        self.status = None;
                        tick.firmware_latched = Some(version);
                        let _ = self
                            .event_tx
                            .send(DriverEvent::FirmwareDetected { version });
                        self.transition(SyncState::Synced);
                    }
                    None => {
                        if self.state == SyncState::Unknown {
                            let _ = self.event_tx.send(DriverEvent::StatusText {
                                text: NO_RESPONSE.to_string(),
                            });
                        }
                        tick.sent = self.send_wanted().await;
                        self.transition(SyncState::Probing);
                    }
                }
            }
            Some(_) => {
                let converged = self
                    .observed
                    .as_ref()
                    .is_some_and(|obs| self.codec.converged(&self.wanted, obs));
                if converged {
                    self.transition(SyncState::Synced);
                } else {
                    tick.sent = self.send_wanted().await;
                    self.transition(SyncState::Diverged);
                }
            }
        }

        tick.state = self.state;
        tick
    }

    /// Send `safe` as the final frame and close the transport.
    ///
    /// The engine is inert afterwards: heartbeats and sends do nothing.
    pub async fn close(&mut self, safe: C::Frame) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.wanted = safe;
        self.send_wanted().await;
        self.closed = true;
        self.observed = None;
        self.transition(SyncState::Unknown);
        let _ = self.event_tx.send(DriverEvent::Closed);
        self.transport.close().await
    }

    async fn drain(&mut self, tick: &mut Tick) {
        let mut newest = None;
        loop {
            match self.transport.try_receive(&mut self.recv_buf).await {
                Ok(Some(n)) => match self.codec.try_decode(&self.recv_buf[..n]) {
                    Some(frame) => {
                        tick.received += 1;
                        newest = Some(frame);
                    }
                    None => {
                        tick.dropped += 1;
                        tracing::trace!(bytes = n, "Dropping foreign datagram");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    if e.is_transient() {
                        tracing::trace!(error = %e, "Transient receive error");
                    } else {
                        tracing::debug!(error = %e, "Receive failed");
                    }
                    break;
                }
            }
        }
        if newest.is_some() {
            self.observed = newest;
        }
    }

    async fn send_wanted(&mut self) -> bool {
        let bytes = self.codec.encode(&self.wanted);
        match self.transport.send(&bytes).await {
            Ok(()) => {
                tracing::trace!(bytes = bytes.len(), state = %self.state, "Sent wanted frame");
                true
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::trace!(error = %e, "Transient send error");
                } else {
                    tracing::debug!(error = %e, "Send failed");
                }
                false
            }
        }
    }

    fn transition(&mut self, to: SyncState) {
        if self.state != to {
            let from = self.state;
            tracing::debug!(from = %from, to = %to, "Sync state changed");
            self.state = to;
            let _ = self.event_tx.send(DriverEvent::SyncStateChanged { from, to });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_link::SharedLink;

    #[derive(Debug, Clone, PartialEq)]
    struct TestFrame {
        tune: u8,
        level: u8,
        version: u8,
    }

    struct TestCodec;

    impl FrameCodec for TestCodec {
        type Frame = TestFrame;
        const MAX_FRAME_LEN: usize = 5;

        fn encode(&self, f: &TestFrame) -> Vec<u8> {
            vec![b'T', b'f', f.tune, f.level, f.version]
        }

        fn try_decode(&self, buf: &[u8]) -> Option<TestFrame> {
            if buf.len() != 5 || &buf[..2] != b"Tf" {
                return None;
            }
            Some(TestFrame {
                tune: buf[2],
                level: buf[3],
                version: buf[4],
            })
        }

        fn handshake_matches(&self, w: &TestFrame, o: &TestFrame) -> bool {
            w.tune == o.tune && w.level == o.level
        }

        fn firmware_version(&self, o: &TestFrame) -> u8 {
            o.version
        }
    }

    fn frame(tune: u8, version: u8) -> TestFrame {
        TestFrame {
            tune,
            level: 7,
            version,
        }
    }

    fn engine() -> (SyncEngine<TestCodec>, SharedLink, broadcast::Receiver<DriverEvent>) {
        let link = SharedLink::default();
        let (tx, rx) = broadcast::channel(32);
        let engine = SyncEngine::new(TestCodec, Box::new(link.clone()), frame(1, 0), tx);
        (engine, link, rx)
    }

    #[tokio::test]
    async fn first_tick_sends_handshake_and_reports_no_response() {
        let (mut engine, link, mut rx) = engine();
        assert_eq!(engine.state(), SyncState::Unknown);
        assert_eq!(engine.status_text(), Some(NO_RESPONSE));

        let tick = engine.heartbeat().await;
        assert_eq!(tick.state, SyncState::Probing);
        assert!(tick.sent);
        assert_eq!(link.sent(), vec![vec![b'T', b'f', 1, 7, 0]]);
        assert_eq!(
            rx.try_recv().unwrap(),
            DriverEvent::StatusText {
                text: NO_RESPONSE.into()
            }
        );
    }

    #[tokio::test]
    async fn silent_device_gets_identical_resends() {
        let (mut engine, link, _rx) = engine();
        for _ in 0..5 {
            engine.heartbeat().await;
            assert!(engine.observed().is_none());
        }
        let sent = link.sent();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|s| *s == sent[0]));
        assert_eq!(engine.state(), SyncState::Probing);
        assert_eq!(engine.status_text(), Some(NO_RESPONSE));
    }

    #[tokio::test]
    async fn handshake_echo_latches_firmware() {
        let (mut engine, link, mut rx) = engine();
        engine.heartbeat().await;
        link.push(&[b'T', b'f', 1, 7, 3]);

        let tick = engine.heartbeat().await;
        assert_eq!(tick.firmware_latched, Some(3));
        assert_eq!(tick.state, SyncState::Synced);
        assert!(!tick.sent);
        assert_eq!(engine.firmware_version(), Some(3));
        assert_eq!(engine.status_text(), None);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.contains(&DriverEvent::FirmwareDetected { version: 3 }));
    }

    #[tokio::test]
    async fn echo_for_other_header_does_not_latch() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        link.push(&[b'T', b'f', 9, 7, 3]);
        let tick = engine.heartbeat().await;
        assert_eq!(tick.firmware_latched, None);
        assert_eq!(tick.state, SyncState::Probing);
        assert!(tick.sent);
    }

    #[tokio::test]
    async fn change_diverges_then_converges_without_further_sends() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        link.push(&[b'T', b'f', 1, 7, 3]);
        engine.heartbeat().await;

        // Owner rebuilds for the detected firmware.
        assert!(engine.set_wanted(frame(1, 3)));
        let tick = engine.heartbeat().await;
        // The handshake echo already equals the rebuilt frame.
        assert_eq!(tick.state, SyncState::Synced);

        assert!(engine.set_wanted(frame(2, 3)));
        assert_eq!(engine.state(), SyncState::Diverged);
        let before = link.sent().len();
        let tick = engine.heartbeat().await;
        assert!(tick.sent);
        assert_eq!(link.sent().len(), before + 1);

        link.push(&[b'T', b'f', 2, 7, 3]);
        let tick = engine.heartbeat().await;
        assert_eq!(tick.state, SyncState::Synced);
        assert!(!tick.sent);

        for _ in 0..3 {
            assert!(!engine.heartbeat().await.sent);
        }
        assert_eq!(link.sent().len(), before + 1);
    }

    #[tokio::test]
    async fn unchanged_set_wanted_is_ignored() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        link.push(&[b'T', b'f', 1, 7, 0]);
        engine.heartbeat().await;
        assert!(!engine.set_wanted(frame(1, 0)));
        assert_eq!(engine.state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn foreign_datagrams_leave_observed_alone() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        link.push(&[b'T', b'f', 1, 7, 1]);
        engine.heartbeat().await;
        let observed = engine.observed().cloned();

        let mut wrong_magic = vec![b'X', b'y'];
        wrong_magic.extend_from_slice(&[0u8; 20]);
        link.push(&wrong_magic);
        link.push(&[b'T', b'f', 1]);
        let tick = engine.heartbeat().await;
        assert_eq!(tick.dropped, 2);
        assert_eq!(tick.received, 0);
        assert_eq!(engine.observed().cloned(), observed);
    }

    #[tokio::test]
    async fn newest_echo_wins() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        link.push(&[b'T', b'f', 5, 7, 1]);
        link.push(&[b'T', b'f', 1, 7, 1]);
        let tick = engine.heartbeat().await;
        assert_eq!(tick.received, 2);
        assert_eq!(engine.observed(), Some(&frame(1, 1)));
        assert_eq!(tick.firmware_latched, Some(1));
    }

    #[tokio::test]
    async fn backlog_is_drained_to_the_newest_echo() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        for _ in 0..70 {
            link.push(&[b'T', b'f', 5, 7, 1]);
        }
        link.push(&[b'T', b'f', 1, 7, 9]);

        let tick = engine.heartbeat().await;
        assert_eq!(tick.received, 71);
        assert_eq!(engine.observed(), Some(&frame(1, 9)));
        assert_eq!(tick.state, SyncState::Synced);
        assert_eq!(engine.firmware_version(), Some(9));
        assert!(!tick.sent);
    }

    #[tokio::test]
    async fn send_failures_are_swallowed() {
        let (mut engine, link, _rx) = engine();
        link.fail_sends(true);
        for _ in 0..3 {
            let tick = engine.heartbeat().await;
            assert!(!tick.sent);
            assert_eq!(tick.state, SyncState::Probing);
        }
        link.fail_sends(false);
        assert!(engine.heartbeat().await.sent);
    }

    #[tokio::test]
    async fn close_sends_safe_frame_and_goes_inert() {
        let (mut engine, link, _rx) = engine();
        engine.heartbeat().await;
        engine.close(frame(0, 0)).await.unwrap();

        assert_eq!(link.sent().last().unwrap(), &vec![b'T', b'f', 0, 7, 0]);
        assert!(engine.is_closed());
        assert_eq!(engine.state(), SyncState::Unknown);
        assert!(!link.is_connected());

        let count = link.sent().len();
        engine.heartbeat().await;
        assert!(!engine.send_now().await);
        assert_eq!(link.sent().len(), count);
    }
}
