//! Datagram mock transport for deterministic driver tests.
//!
//! [`MockTransport`] behaves like a connected UDP socket to a front-end. The
//! test keeps a [`MockHandle`] to the same state after the transport has been
//! boxed into a driver, and uses it to:
//!
//! - inspect every datagram the driver sent,
//! - queue datagrams for the driver to receive,
//! - install a responder that plays the device (echoing frames back, or
//!   rewriting them like firmware would),
//! - drop datagrams at random with a seeded RNG,
//! - make sends fail.
//!
//! # Example
//!
//! ```
//! use sdrlink_core::transport::Transport;
//! use sdrlink_test_harness::MockTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut mock = MockTransport::new();
//! let handle = mock.handle();
//! handle.echo();
//!
//! mock.send(b"St\x00\x01").await.unwrap();
//! let mut buf = [0u8; 16];
//! let n = mock.try_receive(&mut buf).await.unwrap().unwrap();
//! assert_eq!(&buf[..n], b"St\x00\x01");
//! assert_eq!(handle.sent_data(), vec![b"St\x00\x01".to_vec()]);
//! # }
//! ```

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sdrlink_core::error::{Error, Result};
use sdrlink_core::transport::Transport;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

struct Loss {
    rng: StdRng,
    probability: f64,
}

#[derive(Default)]
struct Inner {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    loss: Option<Loss>,
    failing_sends: usize,
    connected: bool,
    dropped: usize,
}

impl Inner {
    fn lost(&mut self) -> bool {
        let Some(loss) = self.loss.as_mut() else {
            return false;
        };
        if loss.rng.gen_bool(loss.probability) {
            self.dropped += 1;
            true
        } else {
            false
        }
    }
}

/// A mock [`Transport`] carrying whole datagrams.
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

/// Test-side view of a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<Mutex<Inner>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// A connected transport with no device behind it.
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(Inner {
                connected: true,
                ..Inner::default()
            })),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            inner: self.inner.clone(),
        }
    }

    /// Shorthand for [`MockHandle::sent_data`].
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle().sent_data()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Every datagram the driver attempted to send, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.inner).sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.inner).sent.len()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        lock(&self.inner).sent.last().cloned()
    }

    pub fn clear_sent(&self) {
        lock(&self.inner).sent.clear();
    }

    /// Queue a datagram for the driver to receive.
    pub fn queue_inbound(&self, data: &[u8]) {
        lock(&self.inner).inbound.push_back(data.to_vec());
    }

    pub fn pending_inbound(&self) -> usize {
        lock(&self.inner).inbound.len()
    }

    /// Play the device: each delivered datagram is passed to `f` and its
    /// return value, if any, is queued as the reply.
    pub fn set_responder<F>(&self, f: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        lock(&self.inner).responder = Some(Box::new(f));
    }

    /// Echo every delivered datagram unchanged.
    pub fn echo(&self) {
        self.set_responder(|data| Some(data.to_vec()));
    }

    /// Remove the responder; the device goes silent.
    pub fn silence(&self) {
        lock(&self.inner).responder = None;
    }

    /// Drop datagrams in either direction with `probability`, reproducibly.
    pub fn set_loss(&self, seed: u64, probability: f64) {
        lock(&self.inner).loss = Some(Loss {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
        });
    }

    /// Datagrams dropped by the loss model so far.
    pub fn dropped(&self) -> usize {
        lock(&self.inner).dropped
    }

    /// Make the next `count` sends fail with `ConnectionRefused`.
    pub fn fail_sends(&self, count: usize) {
        lock(&self.inner).failing_sends = count;
    }

    /// When `false`, sends and receives return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.inner).connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        inner.sent.push(data.to_vec());
        if inner.failing_sends > 0 {
            inner.failing_sends -= 1;
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }
        if inner.lost() {
            return Ok(());
        }
        let reply = match inner.responder.as_mut() {
            Some(responder) => responder(data),
            None => None,
        };
        if let Some(reply) = reply {
            if !inner.lost() {
                inner.inbound.push_back(reply);
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if let Some(n) = self.try_receive(buf).await? {
            return Ok(n);
        }
        if !timeout.is_zero() {
            tokio::time::sleep(timeout).await;
            if let Some(n) = self.try_receive(buf).await? {
                return Ok(n);
            }
        }
        Err(Error::Timeout)
    }

    async fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        Ok(inner.inbound.pop_front().map(|datagram| {
            // Excess bytes are discarded, as with a short UDP read.
            let n = datagram.len().min(buf.len());
            buf[..n].copy_from_slice(&datagram[..n]);
            n
        }))
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.connected = false;
        inner.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }
}
