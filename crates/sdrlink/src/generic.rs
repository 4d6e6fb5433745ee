//! Generic -- a [`HardwareDriver`] with no hardware behind it.
//!
//! Used when the front-end has no control interface of its own, or when
//! the host only needs the driver surface (for example a file or sound
//! card source). Tuning is taken as given and the link is always in sync
//! once open.

use async_trait::async_trait;
use tokio::sync::broadcast;

use sdrlink_core::driver::HardwareDriver;
use sdrlink_core::error::Result;
use sdrlink_core::events::{DriverEvent, EVENT_CHANNEL_CAPACITY};
use sdrlink_core::sync::SyncState;
use sdrlink_core::types::{DeviceFamily, DriverInfo, Mode, Tuning};

pub struct Generic {
    info: DriverInfo,
    open: bool,
    tuning: Tuning,
    mode: Option<Mode>,
    band: Option<String>,
    event_tx: broadcast::Sender<DriverEvent>,
}

impl Generic {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Generic {
            info: DriverInfo {
                family: DeviceFamily::Generic,
                model_name: "Generic".to_string(),
            },
            open: false,
            tuning: Tuning::exact(0, 0),
            mode: None,
            band: None,
            event_tx,
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn band(&self) -> Option<&str> {
        self.band.as_deref()
    }
}

impl Default for Generic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareDriver for Generic {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    async fn open(&mut self) -> Result<String> {
        if !self.open {
            self.open = true;
            let _ = self.event_tx.send(DriverEvent::SyncStateChanged {
                from: SyncState::Unknown,
                to: SyncState::Synced,
            });
            tracing::info!("Generic driver opened");
        }
        Ok("no hardware control".to_string())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            let _ = self.event_tx.send(DriverEvent::SyncStateChanged {
                from: SyncState::Synced,
                to: SyncState::Unknown,
            });
            let _ = self.event_tx.send(DriverEvent::Closed);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_frequency(&mut self, tx_hz: Option<i64>, vfo_hz: i64) -> Tuning {
        let tx = tx_hz.filter(|&t| t > 0).unwrap_or(self.tuning.tx_hz);
        self.tuning = Tuning::exact(tx, vfo_hz);
        self.tuning
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = Some(mode);
    }

    fn set_band(&mut self, band: &str) {
        self.band = Some(band.to_string());
    }

    async fn heartbeat(&mut self) -> SyncState {
        self.sync_state()
    }

    fn sync_state(&self) -> SyncState {
        if self.open {
            SyncState::Synced
        } else {
            SyncState::Unknown
        }
    }

    fn firmware_version(&self) -> Option<u8> {
        None
    }

    fn status_text(&self) -> Option<String> {
        None
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.event_tx.subscribe()
    }

    fn vfo_float(&self) -> Option<f64> {
        Some(self.tuning.vfo_actual_hz)
    }
}
