//! The `HardwareDriver` trait -- unified interface for all front-end families.
//!
//! A host (GUI, CLI, automation) opens a driver, pushes operator settings
//! into it from its control task, and calls [`HardwareDriver::heartbeat`]
//! about ten times a second. All driver state is owned by that one task;
//! setters only rebuild the wanted device state, the heartbeat moves it to
//! the hardware.
//!
//! Optional capabilities default to an `Unsupported` error or a neutral
//! value, so simple families only implement what they have.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::events::DriverEvent;
use crate::sync::SyncState;
use crate::types::{DriverInfo, Mode, Tuning};
use crate::vna::{SweepEndpoints, VnaSweepSpec};

/// Nominal heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Unified interface for controlling an SDR front-end.
#[async_trait]
pub trait HardwareDriver: Send {
    /// Static information about this driver.
    fn info(&self) -> &DriverInfo;

    /// Open the transport and start the handshake.
    ///
    /// Returns a short description for the operator. This is the only
    /// operation that reports hard errors; on failure the driver stays
    /// closed and every other operation is a no-op.
    async fn open(&mut self) -> Result<String>;

    /// Send the safe frame and release the transport.
    async fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Tune. `tx_hz` of `None` leaves the transmit frequency unchanged.
    ///
    /// Returns the tuning actually applied.
    fn set_frequency(&mut self, tx_hz: Option<i64>, vfo_hz: i64) -> Tuning;

    fn set_mode(&mut self, mode: Mode);

    fn set_band(&mut self, band: &str);

    /// Run one reconciliation tick. Never fails; problems show up in the
    /// returned state and in [`status_text`](Self::status_text).
    async fn heartbeat(&mut self) -> SyncState;

    fn sync_state(&self) -> SyncState;

    /// Firmware version, once the device has answered.
    fn firmware_version(&self) -> Option<u8>;

    /// Sticky status text, e.g. "no hardware response".
    fn status_text(&self) -> Option<String>;

    /// Subscribe to driver events.
    fn subscribe(&self) -> broadcast::Receiver<DriverEvent>;

    /// Labels for the sample rate selector. Empty when the rate is fixed.
    fn decimation_choices(&self) -> Vec<String> {
        Vec::new()
    }

    /// Select a sample rate by index into
    /// [`decimation_choices`](Self::decimation_choices). `None` picks the
    /// configured default. Returns the resulting sample rate.
    fn set_decimation(&mut self, _index: Option<usize>) -> u32 {
        0
    }

    /// Select the entry whose sample rate is nearest `rate_hz`. Returns the
    /// chosen index and rate, or `None` when the rate is fixed.
    fn select_decimation(&mut self, _rate_hz: u32) -> Option<(usize, u32)> {
        None
    }

    fn decimation_index(&self) -> Option<usize> {
        None
    }

    /// Lowest and highest selectable sample rate.
    fn decimation_range(&self) -> Option<(u32, u32)> {
        None
    }

    /// Start a VNA sweep. Returns the realized sweep endpoints.
    fn set_vna(&mut self, _spec: &VnaSweepSpec) -> Result<SweepEndpoints> {
        Err(Error::Unsupported("VNA sweep not supported".into()))
    }

    /// Key or unkey the transmitter.
    async fn set_ptt(&mut self, _on: bool) -> Result<()> {
        Err(Error::Unsupported("PTT not supported".into()))
    }

    /// Exact tuned receive frequency, if the driver tracks one.
    fn vfo_float(&self) -> Option<f64> {
        None
    }
}

/// Drive `driver` at a fixed interval until `cancel` fires, then close it.
///
/// The stop signal is checked at the top of every tick, so the safe frame
/// goes out within one interval of cancellation.
pub async fn run_heartbeat(
    driver: &mut dyn HardwareDriver,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                driver.heartbeat().await;
            }
        }
    }
    tracing::debug!(model = %driver.info().model_name, "Heartbeat stopped, closing driver");
    driver.close().await
}
