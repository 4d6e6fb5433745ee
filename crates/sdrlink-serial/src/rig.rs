//! SerialLegacy -- the [`HardwareDriver`] implementation for receivers
//! controlled by ASCII commands on a serial port.
//!
//! There is no echo to reconcile against. Setters queue commands, and each
//! heartbeat releases at most one of them once the [`CommandPacer`] allows
//! it. The driver reports `Synced` when the queue is empty and `Diverged`
//! while commands are pending.
//!
//! An optional external key line is polled on its own task; changes are
//! picked up once per heartbeat and published as
//! [`DriverEvent::KeyChanged`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use sdrlink_core::config::{DeviceConfig, KeyLineConfig};
use sdrlink_core::driver::HardwareDriver;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
use sdrlink_core::key::{KeyInput, KeyModeFlags, KeyPoller};
use sdrlink_core::sync::SyncState;
use sdrlink_core::transport::Transport;
use sdrlink_core::types::{DeviceFamily, DriverInfo, Mode, Tuning};
use sdrlink_transport::{KeyLine, SerialConfig, SerialKeyLine, SerialTransport};

use crate::protocol::{self, CommandPacer};

/// Upper bound on bytes discarded from the port per heartbeat.
const MAX_DRAIN_READS: usize = 16;

/// A serial-controlled legacy receiver.
///
/// Constructed via [`SerialLegacyBuilder`](crate::builder::SerialLegacyBuilder).
pub struct SerialLegacy {
    config: DeviceConfig,
    info: DriverInfo,
    transport: Option<Box<dyn Transport>>,
    injected: Option<Box<dyn Transport>>,
    key_input: Option<Box<dyn KeyInput>>,
    poller: Option<KeyPoller>,
    flags: Arc<KeyModeFlags>,
    queue: VecDeque<Vec<u8>>,
    pacer: CommandPacer,
    state: SyncState,
    status: Option<String>,
    sent_rf_hz: Option<i64>,
    vfo_hz: i64,
    tx_hz: i64,
    mode: Option<Mode>,
    band: Option<String>,
    key_down: bool,
    event_tx: broadcast::Sender<DriverEvent>,
}

impl SerialLegacy {
    pub(crate) fn new(
        config: DeviceConfig,
        model_name: String,
        injected: Option<Box<dyn Transport>>,
        key_input: Option<Box<dyn KeyInput>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        SerialLegacy {
            info: DriverInfo {
                family: DeviceFamily::SerialLegacy,
                model_name,
            },
            pacer: CommandPacer::new(config.command_interval),
            config,
            transport: None,
            injected,
            key_input,
            poller: None,
            flags: Arc::new(KeyModeFlags::default()),
            queue: VecDeque::new(),
            state: SyncState::Unknown,
            status: None,
            sent_rf_hz: None,
            vfo_hz: 0,
            tx_hz: 0,
            mode: None,
            band: None,
            key_down: false,
            event_tx,
        }
    }

    /// Commands waiting for the pacer.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn band(&self) -> Option<&str> {
        self.band.as_deref()
    }

    /// Debounced key state as of the last heartbeat.
    pub fn key_down(&self) -> bool {
        self.key_down
    }

    /// Turn the spot tone on or off for the key poller's CW logic.
    pub fn set_spot(&mut self, on: bool) {
        self.flags.set_spot(on);
    }

    /// Queue `cmd`, replacing a pending command with the same mnemonic so
    /// a fast tuning knob does not build a backlog.
    fn enqueue(&mut self, cmd: Vec<u8>) {
        let name = protocol::mnemonic(&cmd).to_string();
        match self
            .queue
            .iter_mut()
            .find(|queued| protocol::mnemonic(queued) == name)
        {
            Some(queued) => *queued = cmd,
            None => self.queue.push_back(cmd),
        }
        if self.transport.is_some() {
            self.transition(SyncState::Diverged);
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

    fn set_status(&mut self, text: Option<String>) {
        if self.status != text {
            if let Some(t) = &text {
                let _ = self.event_tx.send(DriverEvent::StatusText { text: t.clone() });
            }
            self.status = text;
        }
    }

    fn start_key_poller(&mut self) {
        let key_config = self.config.key_line.clone();
        let input: Box<dyn KeyInput> = match (self.key_input.take(), &key_config) {
            (Some(input), _) => input,
            (None, Some(line)) => match SerialKeyLine::open(&line.port, KeyLine::Cts) {
                Ok(k) => Box::new(k),
                Err(e) => {
                    tracing::warn!(port = %line.port, error = %e, "Key line unavailable");
                    return;
                }
            },
            (None, None) => return,
        };
        let line = key_config.unwrap_or_else(|| KeyLineConfig::new(""));
        self.poller = Some(KeyPoller::spawn(input, &line, self.flags.clone()));
    }

    /// Discard anything the receiver sent; it only echoes status text.
    async fn drain(transport: &mut Box<dyn Transport>) {
        let mut buf = [0u8; 64];
        for _ in 0..MAX_DRAIN_READS {
            match transport.try_receive(&mut buf).await {
                Ok(Some(n)) => {
                    tracing::trace!(data = ?String::from_utf8_lossy(&buf[..n]), "Ignoring receiver output");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::trace!(error = %e, "Receive failed");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl HardwareDriver for SerialLegacy {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    async fn open(&mut self) -> Result<String> {
        let port = self
            .config
            .serial
            .as_ref()
            .map(|s| s.port.clone())
            .unwrap_or_default();
        let description = format!("{} on {}", self.info.model_name, port);
        if self.transport.is_some() {
            return Ok(description);
        }

        let transport: Box<dyn Transport> = match self.injected.take() {
            Some(t) => t,
            None => {
                let link = self.config.serial.as_ref().ok_or_else(|| {
                    Error::InvalidParameter("serial port is required".into())
                })?;
                let serial = SerialConfig::legacy_receiver().with_baud_rate(link.baud_rate);
                Box::new(SerialTransport::open_with_config(&link.port, serial).await?)
            }
        };
        self.transport = Some(transport);
        self.queue.clear();
        self.sent_rf_hz = None;
        self.queue.push_back(protocol::cmd_mode_default());
        self.transition(SyncState::Diverged);
        self.start_key_poller();
        tracing::info!(device = %description, "Serial receiver opened");
        Ok(description)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        if let Some(mut poller) = self.poller.take() {
            poller.stop().await;
        }
        self.queue.clear();
        self.pacer.wait().await;
        if let Err(e) = transport.send(&protocol::cmd_exit()).await {
            tracing::warn!(error = %e, "Exit command failed");
        }
        self.pacer.mark(Instant::now());
        self.transition(SyncState::Unknown);
        let _ = self.event_tx.send(DriverEvent::Closed);
        tracing::info!("Serial receiver closed");
        transport.close().await
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn set_frequency(&mut self, tx_hz: Option<i64>, vfo_hz: i64) -> Tuning {
        self.vfo_hz = vfo_hz;
        let rf = protocol::round_to_step(vfo_hz);
        if rf >= protocol::MIN_FREQUENCY_HZ && self.sent_rf_hz != Some(rf) {
            self.sent_rf_hz = Some(rf);
            self.enqueue(protocol::cmd_set_frequency(rf));
        }
        // Receive only: the transmit frequency is reported back, never sent.
        if let Some(tx) = tx_hz.filter(|&t| t > 0) {
            self.tx_hz = tx;
        }
        Tuning {
            tx_hz: self.tx_hz,
            vfo_hz,
            vfo_actual_hz: self.sent_rf_hz.unwrap_or(vfo_hz) as f64,
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        self.flags.set_cw(mode.is_cw());
        self.mode = Some(mode);
    }

    fn set_band(&mut self, band: &str) {
        self.band = Some(band.to_string());
    }

    async fn heartbeat(&mut self) -> SyncState {
        let Some(transport) = self.transport.as_mut() else {
            return SyncState::Unknown;
        };
        Self::drain(transport).await;

        let now = Instant::now();
        let mut failure = None;
        if self.pacer.ready(now) {
            if let Some(cmd) = self.queue.pop_front() {
                match transport.send(&cmd).await {
                    Ok(()) => {
                        tracing::trace!(command = protocol::mnemonic(&cmd), "Sent command");
                        self.pacer.mark(now);
                    }
                    Err(e) => {
                        // Retry on the next tick.
                        tracing::debug!(error = %e, "Command send failed");
                        self.queue.push_front(cmd);
                        failure = Some(e.to_string());
                    }
                }
            }
        }
        self.set_status(failure);

        if let Some(down) = self.poller.as_mut().and_then(|p| p.take_change()) {
            tracing::debug!(down, "Key line changed");
            self.key_down = down;
            let _ = self.event_tx.send(DriverEvent::KeyChanged { down });
        }

        let next = if self.queue.is_empty() {
            SyncState::Synced
        } else {
            SyncState::Diverged
        };
        self.transition(next);
        self.state
    }

    fn sync_state(&self) -> SyncState {
        self.state
    }

    fn firmware_version(&self) -> Option<u8> {
        None
    }

    fn status_text(&self) -> Option<String> {
        self.status.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.event_tx.subscribe()
    }

    async fn set_ptt(&mut self, on: bool) -> Result<()> {
        if self.transport.is_none() {
            return Ok(());
        }
        self.flags.set_ptt(on);
        Ok(())
    }

    fn vfo_float(&self) -> Option<f64> {
        self.sent_rf_hz.map(|f| f as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SerialLegacyBuilder;
    use sdrlink_test_harness::{MockHandle, MockTransport, ScriptedKey};
    use std::time::Duration;

    fn config() -> DeviceConfig {
        DeviceConfig::serial_legacy("/dev/ttyUSB0").with_command_interval(Duration::ZERO)
    }

    async fn open_rig() -> (SerialLegacy, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let mut rig = SerialLegacyBuilder::new(config())
            .build_with_transport(Box::new(mock))
            .unwrap();
        rig.open().await.unwrap();
        (rig, handle)
    }

    fn sent_strings(handle: &MockHandle) -> Vec<String> {
        handle
            .sent_data()
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn open_sends_mode_command() {
        let (mut rig, handle) = open_rig().await;
        assert_eq!(rig.sync_state(), SyncState::Diverged);
        assert_eq!(handle.sent_count(), 0);
        assert_eq!(rig.heartbeat().await, SyncState::Synced);
        assert_eq!(sent_strings(&handle), vec!["MD0\r"]);
    }

    #[tokio::test]
    async fn one_command_per_tick() {
        let (mut rig, handle) = open_rig().await;
        let tuning = rig.set_frequency(Some(7_100_000), 145_504_999);
        assert_eq!(tuning.vfo_actual_hz, 145_500_000.0);
        assert_eq!(tuning.tx_hz, 7_100_000);
        assert_eq!(rig.pending(), 2);

        assert_eq!(rig.heartbeat().await, SyncState::Diverged);
        assert_eq!(rig.heartbeat().await, SyncState::Synced);
        assert_eq!(sent_strings(&handle), vec!["MD0\r", "RF0145500000\r"]);
        assert!(sent_strings(&handle).iter().all(|c| !c.starts_with("TX")));
    }

    #[tokio::test]
    async fn unchanged_or_low_frequency_is_not_sent() {
        let (mut rig, handle) = open_rig().await;
        rig.heartbeat().await;
        rig.set_frequency(None, 14_200_000);
        rig.heartbeat().await;
        handle.clear_sent();

        // Same 10 kHz step.
        rig.set_frequency(None, 14_203_000);
        assert_eq!(rig.pending(), 0);
        rig.set_frequency(None, 94_000);
        assert_eq!(rig.pending(), 0);
        rig.heartbeat().await;
        assert_eq!(handle.sent_count(), 0);
        assert_eq!(rig.vfo_float(), Some(14_200_000.0));
    }

    #[tokio::test]
    async fn pending_frequency_is_coalesced() {
        let (mut rig, handle) = open_rig().await;
        rig.set_frequency(None, 14_000_000);
        rig.set_frequency(None, 14_100_000);
        rig.set_frequency(None, 14_250_000);
        assert_eq!(rig.pending(), 2);
        rig.heartbeat().await;
        rig.heartbeat().await;
        assert_eq!(sent_strings(&handle), vec!["MD0\r", "RF0014250000\r"]);
    }

    #[tokio::test]
    async fn pacer_holds_commands_between_ticks() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let mut rig = SerialLegacyBuilder::new(
            DeviceConfig::serial_legacy("/dev/ttyUSB0")
                .with_command_interval(Duration::from_millis(50)),
        )
        .build_with_transport(Box::new(mock))
        .unwrap();
        rig.open().await.unwrap();
        rig.set_frequency(None, 7_000_000);

        rig.heartbeat().await;
        assert_eq!(rig.heartbeat().await, SyncState::Diverged);
        assert_eq!(handle.sent_count(), 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rig.heartbeat().await, SyncState::Synced);
        assert_eq!(handle.sent_count(), 2);
    }

    #[tokio::test]
    async fn send_failure_retries() {
        let (mut rig, handle) = open_rig().await;
        handle.fail_sends(1);
        assert_eq!(rig.heartbeat().await, SyncState::Diverged);
        assert!(rig.status_text().is_some());
        assert_eq!(rig.heartbeat().await, SyncState::Synced);
        assert_eq!(rig.status_text(), None);
        // The failed attempt is recorded too.
        assert_eq!(sent_strings(&handle), vec!["MD0\r", "MD0\r"]);
    }

    #[tokio::test]
    async fn close_sends_exit_and_goes_inert() {
        let (mut rig, handle) = open_rig().await;
        let mut events = rig.subscribe();
        rig.set_frequency(None, 7_000_000);
        rig.close().await.unwrap();
        assert_eq!(handle.last_sent().unwrap(), b"EX\r".to_vec());
        assert_eq!(handle.sent_count(), 1);
        assert!(!rig.is_open());
        assert_eq!(rig.heartbeat().await, SyncState::Unknown);

        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            saw_closed |= event == DriverEvent::Closed;
        }
        assert!(saw_closed);
    }

    #[tokio::test]
    async fn unopened_driver_is_inert() {
        let mut rig = SerialLegacyBuilder::new(config())
            .build_with_transport(Box::new(MockTransport::new()))
            .unwrap();
        rig.set_frequency(None, 7_000_000);
        assert_eq!(rig.heartbeat().await, SyncState::Unknown);
        assert!(rig.close().await.is_ok());
        assert!(rig.set_ptt(true).await.is_ok());
    }

    #[tokio::test]
    async fn key_line_changes_become_events() {
        let key = ScriptedKey::new();
        let mut line = KeyLineConfig::new("");
        line.poll_interval = Duration::from_millis(1);
        line.debounce_samples = 1;
        let mock = MockTransport::new();
        let mut rig = SerialLegacyBuilder::new(config().with_key_line(line))
            .key_input(Box::new(key.clone()))
            .build_with_transport(Box::new(mock))
            .unwrap();
        rig.open().await.unwrap();
        let mut events = rig.subscribe();

        key.set_down(true);
        let mut down = false;
        for _ in 0..100 {
            rig.heartbeat().await;
            if rig.key_down() {
                down = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(down);
        let mut saw_key = false;
        while let Ok(event) = events.try_recv() {
            saw_key |= event == DriverEvent::KeyChanged { down: true };
        }
        assert!(saw_key);
        rig.close().await.unwrap();
    }
}
