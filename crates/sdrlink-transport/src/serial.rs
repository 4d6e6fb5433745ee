//! Serial links: command transport and key line.
//!
//! [`SerialTransport`] implements [`Transport`] for the ASCII command port
//! of legacy front-ends (USB virtual COM or RS-232). [`SerialKeyLine`]
//! samples a modem status line of a second port as an external CW key or
//! foot switch for the key poller.
//!
//! # Example
//!
//! ```no_run
//! use sdrlink_core::transport::Transport;
//! use sdrlink_transport::{SerialConfig, SerialTransport};
//!
//! # async fn example() -> sdrlink_core::Result<()> {
//! let mut link =
//!     SerialTransport::open_with_config("/dev/ttyUSB0", SerialConfig::legacy_receiver()).await?;
//! link.send(b"MD0\r").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sdrlink_core::error::{Error, Result};
use sdrlink_core::key::KeyInput;
use sdrlink_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// Serial port settings. Data bits are always eight with no parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// AR8600-style receivers: 9600 baud, two stop bits, XON/XOFF.
    pub fn legacy_receiver() -> Self {
        Self {
            baud_rate: 9600,
            stop_bits: StopBits::Two,
            flow_control: FlowControl::Software,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

fn map_link_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected
    {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

/// Serial command port.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open with default framing (8N1, no flow control).
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_config(port, SerialConfig::default().with_baud_rate(baud_rate)).await
    }

    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            stop_bits = ?config.stop_bits,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        let mut stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        // Receivers with a key or PTT input on DTR/RTS must not see them
        // asserted at open.
        if let Err(e) = stream.write_data_terminal_ready(false) {
            tracing::warn!(port = %port, error = %e, "Failed to de-assert DTR");
        }
        if let Err(e) = stream.write_request_to_send(false) {
            tracing::warn!(port = %port, error = %e, "Failed to de-assert RTS");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        tracing::trace!(port = %self.port_name, data = ?String::from_utf8_lossy(data), "Sending");
        port.write_all(data).await.map_err(map_link_error)?;
        port.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "Received");
                Ok(n)
            }
            Ok(Err(e)) => Err(map_link_error(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "Flush before close failed");
            }
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

/// Modem status line carrying the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLine {
    Cts,
    Dsr,
}

/// A serial port's CTS or DSR line read as a key.
///
/// The port is opened blocking: the key poller calls it from its own task
/// every few milliseconds and a status-line read does not wait on data.
pub struct SerialKeyLine {
    port: Box<dyn SerialPort>,
    line: KeyLine,
}

impl SerialKeyLine {
    pub fn open(port: &str, line: KeyLine) -> Result<Self> {
        let handle = tokio_serial::new(port, 9600)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open key line");
                Error::Transport(format!("Failed to open key line {}: {}", port, e))
            })?;
        tracing::info!(port = %port, line = ?line, "Key line open");
        Ok(Self { port: handle, line })
    }
}

impl KeyInput for SerialKeyLine {
    fn is_key_down(&mut self) -> Result<bool> {
        let level = match self.line {
            KeyLine::Cts => self.port.read_clear_to_send(),
            KeyLine::Dsr => self.port.read_data_set_ready(),
        };
        level.map_err(|e| Error::Transport(e.to_string()))
    }
}
