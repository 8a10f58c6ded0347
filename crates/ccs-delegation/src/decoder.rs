//! Incremental decoder for newline-delimited JSON output.
//!
//! Subprocess pipes deliver data in arbitrary chunks, so a JSON line may be
//! split across reads. The decoder keeps the unterminated tail of the last
//! chunk and prepends it to the next one.

use log::debug;

use crate::error::DecodeError;
use crate::event::StreamEvent;

/// Default cap on a single pending line (10 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Buffer for incomplete JSON lines during streaming.
///
/// One instance per stream. Call [`StreamDecoder::reset`] before reusing an
/// instance for another invocation.
#[derive(Debug)]
pub struct StreamDecoder {
    partial: Vec<u8>,
    max_line_bytes: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_bytes,
        }
    }

    /// Feed one chunk and return the events it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.partial.is_empty() {
                self.check_len(line.len())?;
                push_line(line, &mut events);
            } else {
                self.check_len(self.partial.len() + line.len())?;
                self.partial.extend_from_slice(line);
                let line = std::mem::take(&mut self.partial);
                push_line(&line, &mut events);
            }
        }

        self.check_len(self.partial.len() + rest.len())?;
        self.partial.extend_from_slice(rest);
        Ok(events)
    }

    /// Convenience wrapper around [`StreamDecoder::feed`] for text chunks.
    pub fn feed_str(&mut self, chunk: &str) -> Result<Vec<StreamEvent>, DecodeError> {
        self.feed(chunk.as_bytes())
    }

    /// End of stream: decode a trailing line that was never terminated.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let line = std::mem::take(&mut self.partial);
        push_line(&line, &mut events);
        events
    }

    /// Drop any carried-over partial line.
    pub fn reset(&mut self) {
        self.partial.clear();
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    fn check_len(&mut self, len: usize) -> Result<(), DecodeError> {
        if len > self.max_line_bytes {
            self.partial.clear();
            return Err(DecodeError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        Ok(())
    }
}

fn push_line(line: &[u8], events: &mut Vec<StreamEvent>) {
    if line.trim_ascii().is_empty() {
        return;
    }

    match StreamEvent::parse(line) {
        Ok(event) => events.push(event),
        Err(err) => {
            // Malformed lines are skipped; they never abort the decode.
            let display: String = String::from_utf8_lossy(line).chars().take(200).collect();
            debug!("Failed to parse stream-json line: {err}, line: {display}");
        }
    }
}
