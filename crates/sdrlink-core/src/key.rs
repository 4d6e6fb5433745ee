//! External key-line polling.
//!
//! Some front-ends take their CW key or foot switch on a serial control
//! line rather than through the status frame. A [`KeyPoller`] owns that
//! line on its own task, debounces it, applies the CW hang time, and
//! publishes the resulting transmit state on a single-slot `watch`
//! channel. The control task reads it once per heartbeat with
//! [`KeyPoller::take_change`].
//!
//! The poller never writes driver state. The only thing it reads from the
//! control side is [`KeyModeFlags`], a set of atomics the control task
//! updates when the mode, PTT, or spot changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::KeyLineConfig;
use crate::error::Result;

/// A source of raw key-down samples.
pub trait KeyInput: Send + 'static {
    fn is_key_down(&mut self) -> Result<bool>;
}

impl KeyInput for Box<dyn KeyInput> {
    fn is_key_down(&mut self) -> Result<bool> {
        (**self).is_key_down()
    }
}

/// Mode flags shared from the control task to the poller.
#[derive(Debug, Default)]
pub struct KeyModeFlags {
    cw: AtomicBool,
    ptt: AtomicBool,
    spot: AtomicBool,
}

impl KeyModeFlags {
    pub fn set_cw(&self, on: bool) {
        self.cw.store(on, Ordering::Release);
    }

    pub fn set_ptt(&self, on: bool) {
        self.ptt.store(on, Ordering::Release);
    }

    pub fn set_spot(&self, on: bool) {
        self.spot.store(on, Ordering::Release);
    }

    pub fn is_cw(&self) -> bool {
        self.cw.load(Ordering::Acquire)
    }

    pub fn is_ptt(&self) -> bool {
        self.ptt.load(Ordering::Acquire)
    }

    pub fn is_spot(&self) -> bool {
        self.spot.load(Ordering::Acquire)
    }
}

/// Debounce and hang-time state machine, separate from the task so it can
/// be driven with explicit timestamps.
#[derive(Debug, Clone)]
pub struct KeyState {
    debounce_samples: u32,
    hang_time: Duration,
    stable: bool,
    candidate: bool,
    count: u32,
    transmit: bool,
    last_down: Option<Instant>,
}

impl KeyState {
    pub fn new(debounce_samples: u32, hang_time: Duration) -> Self {
        KeyState {
            debounce_samples: debounce_samples.max(1),
            hang_time,
            stable: false,
            candidate: false,
            count: 0,
            transmit: false,
            last_down: None,
        }
    }

    /// Debounced key state.
    pub fn key_down(&self) -> bool {
        self.stable
    }

    pub fn transmit(&self) -> bool {
        self.transmit
    }

    /// Feed one raw sample; returns the transmit state.
    pub fn update(&mut self, raw: bool, flags: &KeyModeFlags, now: Instant) -> bool {
        if raw == self.stable {
            self.count = 0;
        } else {
            if raw == self.candidate && self.count > 0 {
                self.count += 1;
            } else {
                self.candidate = raw;
                self.count = 1;
            }
            if self.count >= self.debounce_samples {
                self.stable = raw;
                self.count = 0;
            }
        }

        if flags.is_cw() {
            if self.stable || flags.is_spot() {
                self.transmit = true;
                self.last_down = Some(now);
            } else if self.transmit
                && self
                    .last_down
                    .is_none_or(|t| now.duration_since(t) >= self.hang_time)
            {
                self.transmit = false;
            }
        } else {
            self.transmit = self.stable || flags.is_ptt();
        }
        self.transmit
    }
}

/// Background task polling a [`KeyInput`].
pub struct KeyPoller {
    rx: watch::Receiver<bool>,
    flags: Arc<KeyModeFlags>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl KeyPoller {
    /// Spawn the polling task on the current runtime.
    pub fn spawn<I: KeyInput>(input: I, config: &KeyLineConfig, flags: Arc<KeyModeFlags>) -> Self {
        Self::spawn_with(
            input,
            config.poll_interval,
            KeyState::new(config.debounce_samples, config.hang_time),
            flags,
        )
    }

    pub fn spawn_with<I: KeyInput>(
        mut input: I,
        poll_interval: Duration,
        mut state: KeyState,
        flags: Arc<KeyModeFlags>,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_flags = flags.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut failing = false;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if task_cancel.is_cancelled() {
                    break;
                }
                let raw = match input.is_key_down() {
                    Ok(raw) => {
                        failing = false;
                        raw
                    }
                    Err(e) => {
                        if !failing {
                            tracing::warn!(error = %e, "Key line read failed");
                            failing = true;
                        }
                        continue;
                    }
                };
                let transmit = state.update(raw, &task_flags, Instant::now());
                tx.send_if_modified(|current| {
                    if *current != transmit {
                        *current = transmit;
                        true
                    } else {
                        false
                    }
                });
            }
            tracing::debug!("Key poller stopped");
        });

        KeyPoller {
            rx,
            flags,
            cancel,
            task: Some(task),
        }
    }

    /// Current transmit state.
    pub fn transmit(&self) -> bool {
        *self.rx.borrow()
    }

    /// The transmit state if it changed since the last call.
    pub fn take_change(&mut self) -> Option<bool> {
        match self.rx.has_changed() {
            Ok(true) => Some(*self.rx.borrow_and_update()),
            _ => None,
        }
    }

    /// Wait for the next change.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn flags(&self) -> &Arc<KeyModeFlags> {
        &self.flags
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for KeyPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn debounce_requires_consecutive_samples() {
        let flags = KeyModeFlags::default();
        let mut state = KeyState::new(3, ms(0));
        let t = Instant::now();
        assert!(!state.update(true, &flags, t));
        assert!(!state.update(true, &flags, t));
        // Glitch resets the run.
        assert!(!state.update(false, &flags, t));
        assert!(!state.update(true, &flags, t));
        assert!(!state.update(true, &flags, t));
        assert!(state.update(true, &flags, t));
        assert!(state.key_down());
    }

    #[test]
    fn non_cw_follows_key_or_ptt() {
        let flags = KeyModeFlags::default();
        let mut state = KeyState::new(1, ms(500));
        let t = Instant::now();
        assert!(state.update(true, &flags, t));
        assert!(!state.update(false, &flags, t));
        flags.set_ptt(true);
        assert!(state.update(false, &flags, t));
    }

    #[test]
    fn cw_release_holds_for_hang_time() {
        let flags = KeyModeFlags::default();
        flags.set_cw(true);
        let mut state = KeyState::new(1, ms(500));
        let t0 = Instant::now();
        assert!(state.update(true, &flags, t0));
        assert!(state.update(false, &flags, t0 + ms(100)));
        assert!(state.update(false, &flags, t0 + ms(499)));
        assert!(!state.update(false, &flags, t0 + ms(500)));
    }

    #[test]
    fn cw_spot_keeps_transmitting() {
        let flags = KeyModeFlags::default();
        flags.set_cw(true);
        flags.set_spot(true);
        let mut state = KeyState::new(1, ms(10));
        let t0 = Instant::now();
        assert!(state.update(false, &flags, t0));
        assert!(state.update(false, &flags, t0 + ms(100)));
        flags.set_spot(false);
        assert!(!state.update(false, &flags, t0 + ms(200)));
    }

    struct Pattern {
        samples: Vec<bool>,
        at: Arc<AtomicUsize>,
    }

    impl KeyInput for Pattern {
        fn is_key_down(&mut self) -> Result<bool> {
            let i = self.at.fetch_add(1, Ordering::SeqCst);
            Ok(*self.samples.get(i).unwrap_or(self.samples.last().unwrap()))
        }
    }

    struct Broken;

    impl KeyInput for Broken {
        fn is_key_down(&mut self) -> Result<bool> {
            Err(Error::Transport("line gone".into()))
        }
    }

    #[tokio::test]
    async fn poller_publishes_transitions() {
        let at = Arc::new(AtomicUsize::new(0));
        let input = Pattern {
            samples: vec![false, true, true, true],
            at: at.clone(),
        };
        let flags = Arc::new(KeyModeFlags::default());
        let mut poller =
            KeyPoller::spawn_with(input, ms(1), KeyState::new(2, ms(0)), flags.clone());

        let down = tokio::time::timeout(ms(1000), poller.changed()).await.unwrap();
        assert_eq!(down, Some(true));
        assert!(poller.transmit());
        assert_eq!(poller.take_change(), None);

        poller.stop().await;
        let polled = at.load(Ordering::SeqCst);
        tokio::time::sleep(ms(10)).await;
        assert_eq!(at.load(Ordering::SeqCst), polled);
    }

    #[tokio::test]
    async fn poller_survives_read_errors() {
        let flags = Arc::new(KeyModeFlags::default());
        let mut poller = KeyPoller::spawn_with(Broken, ms(1), KeyState::new(1, ms(0)), flags);
        tokio::time::sleep(ms(10)).await;
        assert!(!poller.transmit());
        assert_eq!(poller.take_change(), None);
        poller.stop().await;
    }
}
