//! Streaming event types and the body-to-event adapter

use crate::frame::{Frame, FrameParser};
use async_stream::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while a chat response streams in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Assistant text delta
    Delta { text: String },
    /// The server reported an error frame
    ServerError { message: String },
    /// The body broke the frame protocol
    ProtocolError { message: String },
    /// The connection failed mid-stream
    TransportError { message: String },
    /// The server closed the stream normally
    Done,
}

impl StreamEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta { .. })
    }

    /// Error text carried by a failed terminal event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            StreamEvent::ServerError { message }
            | StreamEvent::ProtocolError { message }
            | StreamEvent::TransportError { message } => Some(message),
            _ => None,
        }
    }
}

impl From<Frame> for StreamEvent {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Content(text) => StreamEvent::Delta { text },
            Frame::Error(message) => StreamEvent::ServerError { message },
            Frame::Protocol(message) => StreamEvent::ProtocolError { message },
        }
    }
}

/// A stream of chat events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Adapt a chunked response body into chat events.
///
/// The returned stream ends right after its first terminal event. Dropping it
/// drops the body, which aborts the underlying connection.
pub fn events_from_body<S, B, E>(body: S) -> StreamEventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    Box::pin(stream! {
        let mut body = Box::pin(body);
        let mut parser = FrameParser::new();
        let mut deltas = 0usize;

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in parser.feed_bytes(bytes.as_ref()) {
                        let event = StreamEvent::from(frame);
                        if event.is_terminal() {
                            tracing::debug!("Stream ended with {:?} after {} deltas", event, deltas);
                            yield event;
                            return;
                        }
                        deltas += 1;
                        yield event;
                    }
                }
                Err(e) => {
                    tracing::debug!("Stream transport failed after {} deltas: {}", deltas, e);
                    yield StreamEvent::TransportError {
                        message: e.to_string(),
                    };
                    return;
                }
            }
        }

        parser.finish();
        tracing::debug!("Stream closed after {} deltas", deltas);
        yield StreamEvent::Done;
    })
}
