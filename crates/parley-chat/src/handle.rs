//! A cloneable handle for poking a chat session from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for cancelling the in-flight request of a session.
///
/// All fields are `Arc`-wrapped, so cloning is cheap. A Ctrl-C watcher holds
/// one while the session task awaits the stream.
#[derive(Clone)]
pub struct ChatHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) is_running: Arc<AtomicBool>,
}

impl ChatHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort the current request. Does nothing while idle.
    pub fn abort(&self) {
        if self.is_running() {
            self.cancel.lock().cancel();
        }
    }

    /// Install a fresh token for a new request and return a clone of it
    pub(crate) fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        self.is_running.store(true, Ordering::Release);
        token
    }

    /// Mark the request finished
    pub(crate) fn disarm(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    /// Whether a request is in flight.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }
}
