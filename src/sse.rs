//! Incremental decoder for the `text/event-stream` bodies the chat API
//! returns when `stream: true` is requested.

use std::borrow::Cow;
use tracing::warn;

/// One decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    /// The `[DONE]` sentinel that terminates a completion stream.
    Done,
}

/// Splits raw response chunks into `data:` lines.
///
/// Bytes are buffered until a full line is available, so a UTF-8 character or
/// a JSON payload split across network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => Cow::Borrowed(line),
        Err(e) => {
            warn!(error = %e, "Invalid UTF-8 in event stream line; replacing bad bytes");
            String::from_utf8_lossy(raw)
        }
    };
    let line = line.trim_end_matches(['\n', '\r']);
    // Blank lines separate events; lines starting with ':' are comments.
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else if payload.is_empty() {
        None
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}
