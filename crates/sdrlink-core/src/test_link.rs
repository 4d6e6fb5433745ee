//! In-memory datagram link for this crate's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::transport::Transport;

#[derive(Default)]
struct Link {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
    closed: bool,
}

/// Cloneable handle; the test body keeps one clone, the code under test
/// owns another as a `Box<dyn Transport>`.
#[derive(Clone, Default)]
pub(crate) struct SharedLink(Arc<Mutex<Link>>);

impl SharedLink {
    pub(crate) fn push(&self, datagram: &[u8]) {
        self.0.lock().unwrap().inbound.push_back(datagram.to_vec());
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().sent.clone()
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.0.lock().unwrap().fail_sends = fail;
    }
}

#[async_trait]
impl Transport for SharedLink {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut link = self.0.lock().unwrap();
        if link.closed {
            return Err(Error::NotConnected);
        }
        if link.fail_sends {
            return Err(Error::Io(std::io::ErrorKind::ConnectionRefused.into()));
        }
        link.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut link = self.0.lock().unwrap();
        match link.inbound.pop_front() {
            Some(d) => {
                buf[..d.len()].copy_from_slice(&d);
                Ok(d.len())
            }
            None => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.0.lock().unwrap().closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.0.lock().unwrap().closed
    }
}
