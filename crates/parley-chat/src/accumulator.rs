//! Assistant message accumulator
//!
//! Owns the in-progress assistant message of one stream. Every call carries
//! the [`RequestToken`] of the request it belongs to; calls for any other
//! token are stale tails of an earlier stream and are dropped.

use crate::history::{History, Seal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation counter identifying one send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestToken(pub u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an accepted delta did to the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The first delta created the assistant message at this index
    Started(usize),
    /// The delta extended the message at this index
    Extended(usize),
}

impl Applied {
    pub fn index(&self) -> usize {
        match self {
            Applied::Started(i) | Applied::Extended(i) => *i,
        }
    }
}

#[derive(Debug, Default)]
pub struct Accumulator {
    active: Option<RequestToken>,
    pending: Option<usize>,
    text: String,
    thinking: bool,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token whose deltas are currently accepted
    pub fn active(&self) -> Option<RequestToken> {
        self.active
    }

    /// Index of the message being streamed, once the first delta arrived
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the thinking indicator is showing
    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// Start accepting deltas for `token`
    pub fn begin(&mut self, token: RequestToken, thinking: bool) {
        if let Some(previous) = self.active {
            tracing::warn!("Accumulator {} replaced by {} before finishing", previous, token);
        }
        self.active = Some(token);
        self.pending = None;
        self.text.clear();
        self.thinking = thinking;
    }

    fn accepts(&self, token: RequestToken, op: &str) -> bool {
        if self.active == Some(token) {
            return true;
        }
        tracing::warn!(
            "Dropping stale {} for {} (active: {:?})",
            op,
            token,
            self.active
        );
        false
    }

    /// Apply a content delta. Returns `None` when the call was dropped.
    pub fn append(
        &mut self,
        history: &mut History,
        token: RequestToken,
        delta: &str,
    ) -> Option<Applied> {
        if !self.accepts(token, "delta") || delta.is_empty() {
            return None;
        }
        self.thinking = false;
        self.text.push_str(delta);

        match self.pending {
            Some(index) => {
                if history.update_streaming(index, self.text.clone()) {
                    Some(Applied::Extended(index))
                } else {
                    tracing::warn!("Streaming message {} vanished from history", index);
                    self.deactivate();
                    None
                }
            }
            None => match history.begin_streaming(self.text.clone()) {
                Ok(index) => {
                    self.pending = Some(index);
                    Some(Applied::Started(index))
                }
                Err(e) => {
                    tracing::warn!("Cannot start streaming message: {}", e);
                    self.deactivate();
                    None
                }
            },
        }
    }

    /// Seal the message with the full text and stop accepting deltas.
    /// Returns the sealed index, if a message had been started.
    pub fn finalize(&mut self, history: &mut History, token: RequestToken) -> Option<usize> {
        self.seal(history, token, Seal::Complete, "finalize")
    }

    /// Seal the partial message as interrupted after a cancellation
    pub fn abandon(&mut self, history: &mut History, token: RequestToken) -> Option<usize> {
        self.seal(history, token, Seal::Interrupted, "abandon")
    }

    /// Seal the partial message of a stream that ended on an error
    pub fn fail(&mut self, history: &mut History, token: RequestToken) -> Option<usize> {
        self.seal(history, token, Seal::Failed, "fail")
    }

    fn seal(
        &mut self,
        history: &mut History,
        token: RequestToken,
        seal: Seal,
        op: &str,
    ) -> Option<usize> {
        if !self.accepts(token, op) {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        let sealed = match self.pending {
            Some(index) if history.finish_streaming(index, text, seal) => Some(index),
            _ => None,
        };
        self.deactivate();
        sealed
    }

    fn deactivate(&mut self) {
        self.active = None;
        self.pending = None;
        self.text.clear();
        self.thinking = false;
    }
}
