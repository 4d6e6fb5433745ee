//! Asynchronous driver event types.
//!
//! Drivers emit events through a [`tokio::sync::broadcast`] channel when the
//! link state changes. UIs subscribe to render status text without polling
//! the driver. Delivery is best-effort; slow consumers may miss events.

use crate::sync::SyncState;

/// An event emitted by a hardware driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// The sync engine moved between states.
    SyncStateChanged {
        from: SyncState,
        to: SyncState,
    },

    /// The device answered the handshake and reported its firmware version.
    FirmwareDetected {
        version: u8,
    },

    /// The external key line changed state (debounced, after hang time).
    KeyChanged {
        down: bool,
    },

    /// Status text for the operator, e.g. "no hardware response".
    StatusText {
        text: String,
    },

    /// The driver was closed and the safe frame sent.
    Closed,
}

/// Capacity of the per-driver event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
