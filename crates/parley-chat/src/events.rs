//! Chat session event types

use crate::settings::Settings;
use parley_api::Message;
use serde::{Deserialize, Serialize};

/// How a send ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The stream closed normally
    Completed,
    /// The user cancelled; partial content was kept
    Cancelled,
    /// A transport, protocol or server error ended the stream
    Errored { message: String },
}

/// Events emitted by a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A request was issued
    RequestStart { token: u64, model: String },

    /// Response headers arrived; the body is streaming
    StreamOpen { token: u64 },

    /// The model is reasoning and no text has arrived yet
    ThinkingStart,

    /// The thinking indicator went away
    ThinkingEnd,

    /// A message was appended (user turn or error)
    MessageAdded { index: usize, message: Message },

    /// The first delta created the streaming assistant message
    MessageStart { index: usize },

    /// Text was appended to the streaming message
    MessageDelta { index: usize, delta: String },

    /// The streaming message was sealed
    MessageEnd { index: usize, message: Message },

    /// The request is over
    RequestEnd { token: u64, outcome: SendOutcome },

    /// History was replaced or truncated
    HistoryReset { len: usize },

    /// Settings changed
    SettingsChanged { settings: Settings },

    /// A transient notice was raised
    Notice { message: String },
}

impl ChatEvent {
    /// Check if this is a terminal event for a request
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::RequestEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = ChatEvent::RequestEnd {
            token: 3,
            outcome: SendOutcome::Errored {
                message: "rate limited".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "request_end");
        assert_eq!(json["outcome"]["kind"], "errored");
        assert!(event.is_terminal());

        let delta: ChatEvent =
            serde_json::from_str(r#"{"type":"message_delta","index":1,"delta":"4"}"#).unwrap();
        assert!(matches!(delta, ChatEvent::MessageDelta { index: 1, .. }));
        assert!(!delta.is_terminal());
    }
}
