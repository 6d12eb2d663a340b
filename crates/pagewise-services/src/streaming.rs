//! Server-Sent Events parsing for streamed chat completions.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StreamDelta {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

/// One `chat.completion.chunk` object.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<StreamChoice>,
}

impl StreamChunk {
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(StreamChunk),
    Done,
    Error(String),
}

/// Parse one SSE line. Blank lines, comments, and non-data fields yield `None`.
pub fn parse_sse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();

    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Some(StreamEvent::Chunk(chunk)),
        Err(e) => Some(StreamEvent::Error(format!("Failed to parse chunk: {}", e))),
    }
}

/// Reassembles lines from arbitrarily split network chunks.
///
/// Bytes are buffered until a newline arrives, so multi-byte UTF-8
/// sequences split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and drain every complete line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(self) -> Option<String> {
        if self.pending.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}
