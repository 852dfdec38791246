//! Line buffering for `data:`-framed server-sent events.

/// Accumulates raw chunks and hands out complete lines.
pub(crate) struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Append a raw chunk (lossy UTF-8).
    pub fn push_bytes(&mut self, chunk: &bytes::Bytes) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Take every newline-terminated line, trimmed. A partial trailing line
    /// stays buffered until the next chunk completes it.
    pub fn extract_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            lines.push(self.buffer[..pos].trim().to_string());
            self.buffer.drain(..=pos);
        }
        lines
    }

    /// Whatever is left once the stream has closed.
    pub fn residue(&self) -> &str {
        &self.buffer
    }
}
