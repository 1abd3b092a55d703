//! Server-Sent Events (SSE) line parser.
//!
//! The chat backend streams responses as `event:`/`data:` line pairs.
//! This is a push parser: feed it raw byte chunks exactly as they come
//! off the wire and it yields complete frames, carrying partial lines
//! (and partial UTF-8 sequences) across chunk boundaries. A frame is
//! yielded per `data:` line; the preceding `event:` line, if any, names
//! it. The pending event name is consumed by the data line that follows
//! it, so a stray data line never inherits a stale name.

/// A single SSE frame: the advisory event name plus the raw data line.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// Event name from the preceding `event:` line. Empty when the data
    /// line arrived without one.
    pub event: String,
    /// Raw payload text after `data: `, usually JSON.
    pub data: String,
}

/// Incremental `event:`/`data:` line decoder.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Undelivered bytes: everything after the last `\n` seen. Kept as
    /// bytes so a UTF-8 sequence split across reads survives intact.
    carry: Vec<u8>,
    pending_event: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every frame completed by it.
    /// Chunk boundaries are arbitrary: mid-line, mid-codepoint, or one
    /// byte at a time all produce the same frame sequence.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]);
            self.process_line(line.trim_end_matches('\r'), &mut frames);
        }
        frames
    }

    /// Bytes held over waiting for a newline.
    pub fn residue(&self) -> &[u8] {
        &self.carry
    }

    fn process_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if let Some(name) = line.strip_prefix("event: ") {
            self.pending_event = name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data: ") {
            frames.push(SseFrame {
                event: std::mem::take(&mut self.pending_event),
                data: data.to_string(),
            });
        }
        // other fields (id:, retry:, comments, blank lines) are ignored
    }
}
