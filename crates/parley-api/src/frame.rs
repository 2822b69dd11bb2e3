//! Stream frame parser
//!
//! Turns the chunked body of a streamed chat response into discrete frames.
//! Frames are separated by a blank line and carry one JSON object after a
//! `data: ` marker:
//!
//! ```text
//! data: {"content": "Hel"}
//!
//! data: {"content": "lo"}
//!
//! event: end
//! ```
//!
//! The parser does no I/O. Feed it chunks in arrival order and it yields the
//! same frames no matter where the chunk boundaries fall.

use serde::Deserialize;

/// Separator between frames
pub const FRAME_DELIMITER: &str = "\n\n";

/// Marker that every accepted frame starts with
pub const DATA_PREFIX: &str = "data: ";

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Incremental assistant text
    Content(String),
    /// Error reported by the server
    Error(String),
    /// The stream broke the frame protocol; always the last frame yielded
    Protocol(String),
}

impl Frame {
    /// Whether no further frames follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Error(_) | Frame::Protocol(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode the JSON payload of one `data:` frame.
///
/// `Ok(None)` means the frame is valid but carries nothing to apply (an empty
/// delta). Anything that is not exactly `{content}` or `{error}` fails.
pub fn decode_payload(payload: &str) -> Result<Option<Frame>, String> {
    let wire: WireFrame =
        serde_json::from_str(payload).map_err(|e| format!("malformed frame: {}", e))?;

    match (wire.error, wire.content) {
        (Some(error), _) => Ok(Some(Frame::Error(error))),
        (None, Some(content)) if content.is_empty() => Ok(None),
        (None, Some(content)) => Ok(Some(Frame::Content(content))),
        (None, None) => Err("frame has neither content nor error".to_string()),
    }
}

/// Incremental frame parser with a carry-over buffer
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Decoded text after the last complete frame
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    /// Set after a protocol error; all further input is ignored
    failed: bool,
}

impl FrameParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the parser stopped on a protocol error
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Text carried over to the next chunk
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Feed a raw byte chunk, decoding UTF-8 across chunk boundaries
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.failed {
            return Vec::new();
        }
        self.pending_bytes.extend_from_slice(bytes);
        let text = self.take_decoded();
        self.feed(&text)
    }

    /// Feed a decoded text chunk
    pub fn feed(&mut self, chunk: &str) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.failed {
            return frames;
        }
        self.buffer.push_str(chunk);

        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].find(FRAME_DELIMITER) {
            let raw = &self.buffer[consumed..consumed + pos];
            consumed += pos + FRAME_DELIMITER.len();

            match parse_frame(raw) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(message) => {
                    tracing::debug!("Stream frame rejected: {}", message);
                    frames.push(Frame::Protocol(message));
                    self.failed = true;
                    self.buffer.clear();
                    self.pending_bytes.clear();
                    return frames;
                }
            }
        }
        self.buffer.drain(..consumed);
        frames
    }

    /// Signal end of stream. A partial trailing frame is dropped.
    pub fn finish(&mut self) {
        if !self.pending_bytes.is_empty() {
            self.buffer.push(char::REPLACEMENT_CHARACTER);
            self.pending_bytes.clear();
        }
        if !self.failed && !self.buffer.trim().is_empty() {
            tracing::debug!(
                "Discarding {} bytes of unterminated frame at end of stream",
                self.buffer.len()
            );
        }
        self.buffer.clear();
    }

    /// Decode as much of `pending_bytes` as possible. Invalid sequences become
    /// U+FFFD; an incomplete sequence at the end waits for the next chunk.
    fn take_decoded(&mut self) -> String {
        let mut out = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending_bytes[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending_bytes.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending_bytes[start..valid_end]) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending_bytes.drain(..start);
        out
    }
}

/// Parse one delimiter-separated frame. Frames without the data marker
/// (such as `event: end`) carry no payload and are skipped.
fn parse_frame(raw: &str) -> Result<Option<Frame>, String> {
    match raw.strip_prefix(DATA_PREFIX) {
        Some(payload) => decode_payload(payload),
        None => {
            if !raw.trim().is_empty() {
                tracing::trace!("Skipping non-data frame: {:?}", raw);
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(s: &str) -> Frame {
        Frame::Content(s.to_string())
    }

    fn parse_all(chunks: &[&str]) -> Vec<Frame> {
        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(parser.feed(chunk));
        }
        parser.finish();
        frames
    }

    #[test]
    fn test_single_frame() {
        let frames = parse_all(&["data: {\"content\": \"4\"}\n\n"]);
        assert_eq!(frames, vec![content("4")]);
    }

    #[test]
    fn test_frame_split_inside_json() {
        let frames = parse_all(&["data: {\"content\":\"ab", "c\"}\n\n"]);
        assert_eq!(frames, vec![content("abc")]);
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let frames = parse_all(&["data: {\"content\":\"a\"}\n", "\ndata: {\"content\":\"b\"}\n\n"]);
        assert_eq!(frames, vec![content("a"), content("b")]);
    }

    #[test]
    fn test_chunk_boundary_independence_text() {
        let stream = "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo, \"}\n\n\
                      event: end\n\ndata: {\"content\":\"안녕\"}\n\n";
        let whole = parse_all(&[stream]);
        assert_eq!(whole.len(), 3);

        let boundaries: Vec<usize> = stream.char_indices().map(|(i, _)| i).collect();
        for &i in &boundaries {
            for &j in boundaries.iter().filter(|&&j| j >= i) {
                let frames = parse_all(&[&stream[..i], &stream[i..j], &stream[j..]]);
                assert_eq!(frames, whole, "split at {} and {}", i, j);
            }
        }
    }

    #[test]
    fn test_chunk_boundary_independence_bytes() {
        let stream = "data: {\"content\":\"생각 중\"}\n\ndata: {\"content\":\"…done\"}\n\n".as_bytes();
        let mut whole = FrameParser::new();
        let expected = whole.feed_bytes(stream);
        assert_eq!(expected, vec![content("생각 중"), content("…done")]);

        for i in 0..=stream.len() {
            let mut parser = FrameParser::new();
            let mut frames = parser.feed_bytes(&stream[..i]);
            frames.extend(parser.feed_bytes(&stream[i..]));
            assert_eq!(frames, expected, "split at byte {}", i);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = "data: {\"content\":\"é\"}\n\n".as_bytes();
        let mut parser = FrameParser::new();
        let mut frames = Vec::new();
        for b in stream {
            frames.extend(parser.feed_bytes(std::slice::from_ref(b)));
        }
        assert_eq!(frames, vec![content("é")]);
    }

    #[test]
    fn test_remainder_is_carried() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("data: {\"content\":\"x\"}\n\ndata: {\"con");
        assert_eq!(frames, vec![content("x")]);
        assert_eq!(parser.remainder(), "data: {\"con");
    }

    #[test]
    fn test_error_frame() {
        let frames = parse_all(&["data: {\"error\": \"rate limited\"}\n\n"]);
        assert_eq!(frames, vec![Frame::Error("rate limited".into())]);
        assert!(frames[0].is_terminal());
    }

    #[test]
    fn test_error_wins_over_content() {
        let frames = parse_all(&["data: {\"content\":\"x\",\"error\":\"boom\"}\n\n"]);
        assert_eq!(frames, vec![Frame::Error("boom".into())]);
    }

    #[test]
    fn test_non_data_frames_are_skipped() {
        let frames = parse_all(&["event: end\n\n", ": keep-alive\n\n", "\n\n"]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_empty_delta_is_skipped() {
        let frames = parse_all(&["data: {\"content\":\"\"}\n\ndata: {\"content\":\"a\"}\n\n"]);
        assert_eq!(frames, vec![content("a")]);
    }

    #[test]
    fn test_malformed_json_is_terminal() {
        let mut parser = FrameParser::new();
        let frames = parser.feed("data: {\"content\":\"a\"}\n\ndata: {not json}\n\ndata: {\"content\":\"b\"}\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], content("a"));
        assert!(matches!(frames[1], Frame::Protocol(_)));
        assert!(parser.is_failed());

        // Nothing after the failure is consumed
        assert!(parser.feed("data: {\"content\":\"c\"}\n\n").is_empty());
        assert!(parser.feed_bytes(b"data: {\"content\":\"d\"}\n\n").is_empty());
    }

    #[test]
    fn test_unknown_shape_is_protocol_error() {
        let frames = parse_all(&["data: {\"delta\":\"a\"}\n\n"]);
        assert!(matches!(frames.as_slice(), [Frame::Protocol(_)]));

        let frames = parse_all(&["data: {}\n\n"]);
        assert!(matches!(frames.as_slice(), [Frame::Protocol(_)]));

        let frames = parse_all(&["data: [1, 2]\n\n"]);
        assert!(matches!(frames.as_slice(), [Frame::Protocol(_)]));
    }

    #[test]
    fn test_trailing_partial_frame_dropped() {
        let frames = parse_all(&["data: {\"content\":\"a\"}\n\ndata: {\"content\":\"b\"}"]);
        assert_eq!(frames, vec![content("a")]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut parser = FrameParser::new();
        let mut bytes = b"data: {\"content\":\"a".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"b\"}\n\n");
        let frames = parser.feed_bytes(&bytes);
        assert_eq!(frames, vec![content("a\u{FFFD}b")]);
    }
}
