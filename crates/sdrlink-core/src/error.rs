//! Error types for sdrlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Only opening a device surfaces these
//! errors to the caller; the heartbeat path swallows them and reports the
//! outcome through [`SyncState`](crate::sync::SyncState) and status text.

/// The error type for all sdrlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (UDP socket, serial port).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed frame, unexpected reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a datagram or serial data.
    #[error("timeout waiting for response")]
    Timeout,

    /// The requested operation is not supported by this device family.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a driver or synthesis routine.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The device has not been opened, or has been closed.
    #[error("not connected")]
    NotConnected,

    /// The link to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is expected to clear on its own.
    ///
    /// Would-block, timeouts, refused datagrams (ICMP port unreachable on a
    /// connected UDP socket), and lost links all count as transient: the next
    /// heartbeat simply tries again.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout | Error::ConnectionLost => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
