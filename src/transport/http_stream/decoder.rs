//! Line decoder for the chunked-HTTP chat stream
//!
//! The response body is a sequence of newline-terminated lines. Each line is
//! either blank or `data: <payload>`, where the payload is the `[DONE]`
//! sentinel or a JSON object `{"type": "token" | "error" | "complete", ...}`.
//! Network reads may split a line anywhere, so bytes are buffered until a
//! newline is seen.

use bytes::BytesMut;
use serde::Deserialize;
use tokio_util::codec::Decoder;

use crate::error::LinkError;
use crate::types::events::ChatStreamEvent;
use crate::types::options::DEFAULT_MAX_LINE_SIZE;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Payload {
    Token {
        #[serde(default)]
        content: String,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    Complete,
}

/// Decoder turning the chunked chat body into [`ChatStreamEvent`]s
///
/// A line longer than `max_line_size` fails with `LinkError::BufferOverflow`,
/// whether or not its newline arrived in the same read.
#[derive(Debug, Clone)]
pub struct ChunkDecoder {
    max_line_size: usize,
    // Bytes already scanned for a newline
    scanned: usize,
}

impl ChunkDecoder {
    /// Create a decoder with the default maximum line size
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_line_size(DEFAULT_MAX_LINE_SIZE)
    }

    /// Create a decoder with a custom maximum line size
    #[must_use]
    pub const fn with_max_line_size(max_line_size: usize) -> Self {
        Self {
            max_line_size,
            scanned: 0,
        }
    }

    /// Decode a single line, without its terminator
    ///
    /// Returns `None` for lines that carry no event.
    #[must_use]
    pub fn decode_line(line: &str) -> Option<ChatStreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return None;
        }

        let Some(payload) = line.strip_prefix("data:") else {
            log::debug!("Ignoring non-data stream line: {line}");
            return None;
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            return Some(ChatStreamEvent::Done);
        }

        match serde_json::from_str::<Payload>(payload) {
            Ok(Payload::Token { content }) => Some(ChatStreamEvent::Token(content)),
            Ok(Payload::Error { message, content }) => Some(ChatStreamEvent::Error(
                message
                    .or(content)
                    .unwrap_or_else(|| "Unknown stream error".to_string()),
            )),
            Ok(Payload::Complete) => Some(ChatStreamEvent::Complete),
            Err(e) => {
                log::warn!("Skipping malformed stream payload ({e}): {payload}");
                None
            }
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkDecoder {
    type Item = ChatStreamEvent;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ChatStreamEvent>, LinkError> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                if src.len() > self.max_line_size {
                    src.clear();
                    self.scanned = 0;
                    return Err(LinkError::BufferOverflow(self.max_line_size));
                }
                return Ok(None);
            };

            let line_len = self.scanned + offset;
            let line = src.split_to(line_len + 1);
            self.scanned = 0;
            if line_len > self.max_line_size {
                return Err(LinkError::BufferOverflow(self.max_line_size));
            }

            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(event) = Self::decode_line(&text) {
                return Ok(Some(event));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<ChatStreamEvent>, LinkError> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Unterminated trailing line
        let rest = src.split();
        self.scanned = 0;
        if rest.len() > self.max_line_size {
            return Err(LinkError::BufferOverflow(self.max_line_size));
        }
        Ok(Self::decode_line(&String::from_utf8_lossy(&rest)))
    }
}
