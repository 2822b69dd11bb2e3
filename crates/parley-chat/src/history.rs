//! Message history store
//!
//! Ordered conversation turns, oldest first. All mutation goes through the
//! operations here so that at most one message is incomplete, and only as the
//! trailing assistant message of an active stream.

use crate::error::{Error, Result};
use parley_api::{Message, Part, Role};
use std::collections::BTreeSet;

/// How a streamed reply ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Seal {
    /// The stream finished normally
    Complete,
    /// The user stopped the stream
    Interrupted,
    /// The stream ended on an error after some content
    Failed,
}

/// Ordered list of conversation turns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    messages: Vec<Message>,
    /// Replies whose stream failed; the backend never stored them
    failed: BTreeSet<usize>,
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Index of the trailing message still being streamed
    pub fn streaming_index(&self) -> Option<usize> {
        match self.messages.last() {
            Some(m) if !m.is_complete() => Some(self.messages.len() - 1),
            _ => None,
        }
    }

    /// Whether a response is still streaming into the history
    pub fn is_streaming(&self) -> bool {
        self.streaming_index().is_some()
    }

    /// Push a finished message. Refused while a message is streaming; an
    /// incomplete assistant message is stored sealed.
    pub fn append(&mut self, mut message: Message) -> Result<usize> {
        if self.is_streaming() {
            return Err(Error::Streaming);
        }
        if let Message::Assistant { is_complete, .. } = &mut message {
            *is_complete = true;
        }
        self.messages.push(message);
        Ok(self.messages.len() - 1)
    }

    /// Drop the message at `index` and everything after it.
    ///
    /// `index == len` is a no-op. Returns the removed messages.
    pub fn truncate_from(&mut self, index: usize) -> Result<Vec<Message>> {
        let len = self.messages.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        self.failed.split_off(&index);
        Ok(self.messages.split_off(index))
    }

    /// Replace the whole history with a fetched snapshot. Assistant messages
    /// are marked complete since a snapshot never carries a live stream.
    pub fn hydrate(&mut self, messages: Vec<Message>) {
        self.failed.clear();
        self.messages = messages
            .into_iter()
            .map(|mut m| {
                if let Message::Assistant { is_complete, .. } = &mut m {
                    *is_complete = true;
                }
                m
            })
            .collect();
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.failed.clear();
        self.messages.clear();
    }

    /// Push the streaming assistant message; the only way to create an
    /// incomplete message.
    pub(crate) fn begin_streaming(&mut self, content: String) -> Result<usize> {
        if self.is_streaming() {
            return Err(Error::Streaming);
        }
        self.messages.push(Message::Assistant {
            content,
            is_complete: false,
            interrupted: false,
        });
        Ok(self.messages.len() - 1)
    }

    /// Replace the content of the streaming message at `index`
    pub(crate) fn update_streaming(&mut self, index: usize, text: String) -> bool {
        if self.streaming_index() != Some(index) {
            return false;
        }
        match &mut self.messages[index] {
            Message::Assistant { content, .. } => {
                *content = text;
                true
            }
            _ => false,
        }
    }

    /// Seal the streaming message at `index` with its final content
    pub(crate) fn finish_streaming(&mut self, index: usize, text: String, seal: Seal) -> bool {
        if self.streaming_index() != Some(index) {
            return false;
        }
        match &mut self.messages[index] {
            Message::Assistant {
                content,
                is_complete,
                interrupted,
            } => {
                *content = text;
                *is_complete = true;
                *interrupted = seal == Seal::Interrupted;
                if seal == Seal::Failed {
                    self.failed.insert(index);
                }
                true
            }
            _ => false,
        }
    }

    fn expect_role(&self, index: usize, expected: Role) -> Result<&Message> {
        let message = self.messages.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.messages.len(),
        })?;
        if message.role() != expected {
            return Err(Error::WrongRole { index, expected });
        }
        Ok(message)
    }

    /// Text and attachments to resubmit when regenerating the assistant reply at `index`
    pub fn regenerate_source(&self, index: usize) -> Result<(String, Vec<Part>)> {
        self.expect_role(index, Role::Assistant)?;
        let user_index = index.checked_sub(1).ok_or(Error::WrongRole {
            index: 0,
            expected: Role::User,
        })?;
        let user = self.expect_role(user_index, Role::User)?;
        Ok((user.text(), user.attachments()))
    }

    /// Text and attachments to put back into the draft when editing the user turn at `index`
    pub fn edit_source(&self, index: usize) -> Result<(String, Vec<Part>)> {
        let user = self.expect_role(index, Role::User)?;
        Ok((user.text(), user.attachments()))
    }

    /// Whether the backend keeps the message at `index`.
    ///
    /// The backend stores a user turn together with its reply once the reply
    /// streams to completion. Error messages, replies that were stopped or
    /// failed midway, and the user turns that led to them live only here.
    fn is_persisted(&self, index: usize) -> bool {
        let is_stored_reply = |k: usize| {
            matches!(
                self.messages.get(k),
                Some(Message::Assistant {
                    is_complete: true,
                    interrupted: false,
                    ..
                })
            ) && !self.failed.contains(&k)
        };
        match &self.messages[index] {
            Message::User { .. } => is_stored_reply(index + 1),
            Message::Assistant { .. } => {
                is_stored_reply(index)
                    && index > 0
                    && matches!(self.messages[index - 1], Message::User { .. })
            }
            Message::Error { .. } => false,
        }
    }

    /// Position on the backend that corresponds to local `index`
    pub fn remote_index(&self, index: usize) -> usize {
        (0..index.min(self.messages.len()))
            .filter(|&k| self.is_persisted(k))
            .count()
    }

    /// Number of messages the backend holds for this history
    pub fn remote_len(&self) -> usize {
        self.remote_index(self.messages.len())
    }

    /// At most one incomplete message, and only as the trailing assistant turn
    pub fn is_consistent(&self) -> bool {
        self.messages
            .iter()
            .enumerate()
            .all(|(i, m)| m.is_complete() || (i + 1 == self.messages.len() && m.role() == Role::Assistant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> History {
        let mut h = History::new();
        h.append(Message::user("Hello")).unwrap();
        h.append(Message::assistant("Hi")).unwrap();
        h.append(Message::user("2+2?")).unwrap();
        h.append(Message::assistant("4")).unwrap();
        h
    }

    #[test]
    fn test_append_refused_while_streaming() {
        let mut h = sample();
        let idx = h.begin_streaming("par".into()).unwrap();
        assert_eq!(h.streaming_index(), Some(idx));
        assert!(matches!(h.append(Message::user("x")), Err(Error::Streaming)));
        assert!(matches!(h.begin_streaming("y".into()), Err(Error::Streaming)));
        assert!(h.finish_streaming(idx, "partial".into(), Seal::Complete));
        assert!(h.append(Message::user("x")).is_ok());
    }

    #[test]
    fn test_append_seals_incomplete_assistant() {
        let mut h = History::new();
        h.append(Message::Assistant {
            content: "x".into(),
            is_complete: false,
            interrupted: false,
        })
        .unwrap();
        assert!(!h.is_streaming());
        assert!(h.messages()[0].is_complete());
    }

    #[test]
    fn test_truncate_from_bounds() {
        let mut h = sample();
        assert!(h.truncate_from(4).unwrap().is_empty());
        assert_eq!(h.len(), 4);
        assert!(matches!(
            h.truncate_from(5),
            Err(Error::IndexOutOfRange { index: 5, len: 4 })
        ));
        let removed = h.truncate_from(1).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(h.messages(), &[Message::user("Hello")]);
    }

    #[test]
    fn test_truncate_then_hydrate_equals_snapshot() {
        let snapshot = vec![
            Message::user("a"),
            Message::Assistant {
                content: "b".into(),
                is_complete: false,
                interrupted: false,
            },
        ];
        let mut expected = snapshot.clone();
        expected[1] = Message::assistant("b");

        for start in [History::new(), sample(), {
            let mut h = sample();
            h.begin_streaming("live".into()).unwrap();
            h
        }] {
            for i in 0..=start.len() {
                let mut h = start.clone();
                h.truncate_from(i).unwrap();
                h.hydrate(snapshot.clone());
                assert_eq!(h.messages(), expected.as_slice());
                assert!(h.is_consistent());
            }
        }
    }

    #[test]
    fn test_streaming_ops_ignore_wrong_index() {
        let mut h = sample();
        let idx = h.begin_streaming("a".into()).unwrap();
        assert!(!h.update_streaming(idx - 1, "x".into()));
        assert!(!h.finish_streaming(0, "x".into(), Seal::Complete));
        h.truncate_from(idx).unwrap();
        assert!(!h.update_streaming(idx, "late".into()));
        assert_eq!(h.len(), 4);
    }

    #[test]
    fn test_regenerate_source() {
        let mut h = History::new();
        h.append(Message::user_with_parts("Hello", vec![Part::image("a.png", "/u/a.png")]))
            .unwrap();
        h.append(Message::assistant("Hi")).unwrap();

        let (text, parts) = h.regenerate_source(1).unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(parts, vec![Part::image("a.png", "/u/a.png")]);

        assert!(matches!(
            h.regenerate_source(0),
            Err(Error::WrongRole { index: 0, expected: Role::Assistant })
        ));
        assert!(matches!(h.regenerate_source(9), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_regenerate_needs_preceding_user() {
        let mut h = History::new();
        h.append(Message::assistant("orphan")).unwrap();
        assert!(matches!(
            h.regenerate_source(0),
            Err(Error::WrongRole { expected: Role::User, .. })
        ));

        h.append(Message::error("boom")).unwrap();
        h.append(Message::assistant("again")).unwrap();
        assert!(matches!(
            h.regenerate_source(2),
            Err(Error::WrongRole { index: 1, expected: Role::User })
        ));
    }

    #[test]
    fn test_edit_source() {
        let h = sample();
        assert_eq!(h.edit_source(2).unwrap().0, "2+2?");
        assert!(matches!(
            h.edit_source(3),
            Err(Error::WrongRole { expected: Role::User, .. })
        ));
    }

    #[test]
    fn test_remote_index_skips_local_only_messages() {
        let mut h = sample();
        h.append(Message::user("fails")).unwrap();
        h.append(Message::error("rate limited")).unwrap();
        h.append(Message::user("cut")).unwrap();
        h.append(Message::Assistant {
            content: "par".into(),
            is_complete: true,
            interrupted: true,
        })
        .unwrap();
        h.append(Message::user("ok")).unwrap();
        h.append(Message::assistant("done")).unwrap();

        assert_eq!(h.remote_index(2), 2);
        assert_eq!(h.remote_index(4), 4);
        assert_eq!(h.remote_index(8), 4);
        assert_eq!(h.remote_index(9), 5);
        assert_eq!(h.remote_len(), 6);
    }

    #[test]
    fn test_failed_reply_is_local_only() {
        let mut h = sample();
        h.append(Message::user("c")).unwrap();
        let idx = h.begin_streaming("par".into()).unwrap();
        assert!(h.finish_streaming(idx, "par".into(), Seal::Failed));
        h.append(Message::error("boom")).unwrap();
        h.append(Message::user("d")).unwrap();
        h.append(Message::assistant("ok")).unwrap();

        assert!(!h.messages()[idx].is_interrupted());
        assert_eq!(h.remote_index(7), 4);
        assert_eq!(h.remote_len(), 6);

        // Indexes past a truncation point are forgotten
        h.truncate_from(idx).unwrap();
        let again = h.begin_streaming("x".into()).unwrap();
        assert!(h.finish_streaming(again, "x".into(), Seal::Complete));
        assert_eq!(h.remote_len(), 6);
    }

    #[test]
    fn test_invariant_under_operation_sequences() {
        // Deterministic pseudo-random walk over every mutation
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut h = History::new();
        for _ in 0..2000 {
            match next() % 7 {
                0 => {
                    let _ = h.append(Message::user("u"));
                }
                1 => {
                    let _ = h.append(Message::error("e"));
                }
                2 => {
                    let _ = h.begin_streaming("s".into());
                }
                3 => {
                    if let Some(i) = h.streaming_index() {
                        h.update_streaming(i, "more".into());
                    }
                }
                4 => {
                    if let Some(i) = h.streaming_index() {
                        let seal = match next() % 3 {
                            0 => Seal::Complete,
                            1 => Seal::Interrupted,
                            _ => Seal::Failed,
                        };
                        h.finish_streaming(i, "done".into(), seal);
                    }
                }
                5 => {
                    let at = (next() as usize) % (h.len() + 2);
                    let _ = h.truncate_from(at);
                }
                _ => {
                    if next() % 10 == 0 {
                        h.hydrate(vec![Message::user("x"), Message::assistant("y")]);
                    }
                }
            }
            assert!(h.is_consistent(), "broken: {:?}", h.messages());
        }
    }
}
