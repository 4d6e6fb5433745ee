//! ASCII command set of AR8600-style receivers, and command pacing.
//!
//! Every command is a short upper-case mnemonic, a fixed-width decimal
//! argument where one is needed, and a carriage return. The receiver has a
//! small command buffer and no flow control beyond XON/XOFF, so the host
//! must leave a minimum gap between commands.

use std::time::Duration;

use tokio::time::Instant;

/// Command terminator.
pub const TERMINATOR: u8 = b'\r';

/// Tuning step of the receiver's RF command.
pub const TUNING_STEP_HZ: i64 = 10_000;

/// Lowest frequency the receiver accepts.
pub const MIN_FREQUENCY_HZ: i64 = 100_000;

/// Default gap between commands.
pub const DEFAULT_COMMAND_INTERVAL: Duration = Duration::from_millis(20);

fn encode(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.extend_from_slice(body.as_bytes());
    out.push(TERMINATOR);
    out
}

/// Select the receive mode used for SDR IF output (`MD0`).
pub fn cmd_mode_default() -> Vec<u8> {
    encode("MD0")
}

/// Set the receive frequency (`RF` + 10 digits in hertz).
pub fn cmd_set_frequency(freq_hz: i64) -> Vec<u8> {
    encode(&format!("RF{:010}", freq_hz.max(0)))
}

/// Leave remote mode (`EX`).
pub fn cmd_exit() -> Vec<u8> {
    encode("EX")
}

/// Round to the receiver's tuning step, halves up.
pub fn round_to_step(freq_hz: i64) -> i64 {
    (freq_hz + TUNING_STEP_HZ / 2).div_euclid(TUNING_STEP_HZ) * TUNING_STEP_HZ
}

/// Mnemonic of an encoded command, for logging.
pub fn mnemonic(cmd: &[u8]) -> &str {
    let end = cmd
        .iter()
        .position(|b| !b.is_ascii_uppercase())
        .unwrap_or(cmd.len());
    std::str::from_utf8(&cmd[..end]).unwrap_or("?")
}

/// Enforces the minimum spacing between commands.
#[derive(Debug, Clone)]
pub struct CommandPacer {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl CommandPacer {
    pub fn new(interval: Duration) -> Self {
        CommandPacer {
            interval,
            last_sent: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a command may go out at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|t| now.saturating_duration_since(t) >= self.interval)
    }

    /// Time left before the next command may go out.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_sent {
            Some(t) => self.interval.saturating_sub(now.saturating_duration_since(t)),
            None => Duration::ZERO,
        }
    }

    /// Record a command sent at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }

    /// Sleep until a command may go out.
    pub async fn wait(&self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
    }
}

impl Default for CommandPacer {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes() {
        assert_eq!(cmd_mode_default(), b"MD0\r");
        assert_eq!(cmd_set_frequency(145_500_000), b"RF0145500000\r");
        assert_eq!(cmd_exit(), b"EX\r");
    }

    #[test]
    fn rounding_to_ten_khz() {
        assert_eq!(round_to_step(145_504_999), 145_500_000);
        assert_eq!(round_to_step(145_505_000), 145_510_000);
        assert_eq!(round_to_step(94_999), 90_000);
        assert_eq!(round_to_step(0), 0);
    }

    #[test]
    fn mnemonics() {
        assert_eq!(mnemonic(b"RF0145500000\r"), "RF");
        assert_eq!(mnemonic(b"MD0\r"), "MD");
        assert_eq!(mnemonic(b"EX\r"), "EX");
    }

    #[test]
    fn pacer_spacing() {
        let mut pacer = CommandPacer::new(Duration::from_millis(20));
        let t0 = Instant::now();
        assert!(pacer.ready(t0));
        pacer.mark(t0);
        assert!(!pacer.ready(t0 + Duration::from_millis(19)));
        assert_eq!(
            pacer.remaining(t0 + Duration::from_millis(5)),
            Duration::from_millis(15)
        );
        assert!(pacer.ready(t0 + Duration::from_millis(20)));
        assert_eq!(pacer.remaining(t0 + Duration::from_millis(30)), Duration::ZERO);
    }

    #[tokio::test]
    async fn wait_honours_interval() {
        let mut pacer = CommandPacer::new(Duration::from_millis(15));
        let start = Instant::now();
        pacer.mark(start);
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
