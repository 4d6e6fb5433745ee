//! Key input driven by the test.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use sdrlink_core::error::{Error, Result};
use sdrlink_core::key::KeyInput;

/// A [`KeyInput`] whose level is set from the test. Clones share state, so
/// one copy goes to the poller and the other stays with the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedKey {
    down: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// While set, reads fail as if the port had gone away.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of samples taken so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl KeyInput for ScriptedKey {
    fn is_key_down(&mut self) -> Result<bool> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("scripted key line failure".into()));
        }
        Ok(self.down.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_level() {
        let key = ScriptedKey::new();
        let mut input = key.clone();
        assert!(!input.is_key_down().unwrap());
        key.set_down(true);
        assert!(input.is_key_down().unwrap());
        key.set_failing(true);
        assert!(input.is_key_down().is_err());
        assert_eq!(key.reads(), 3);
    }
}
