//! Response rewriting for buffered JSON bodies and SSE streams.
//!
//! Only two shapes are touched: a top-level string `model` in a JSON body,
//! and `message.model` inside `data: ` lines carrying a `message_start`
//! event. Everything else passes through byte-for-byte.

use std::borrow::Cow;

use bytes::Bytes;
use log::debug;
use serde_json::Value;

use crate::model::normalize_model_id;

/// Prefix of SSE data lines.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Rewrite a buffered JSON response body.
///
/// Returns the re-serialized body when the top-level `model` changed, or
/// `None` when the original bytes should be forwarded untouched (not JSON,
/// no `model`, or an id outside the table).
pub fn transform_json_body(body: &[u8]) -> Option<Vec<u8>> {
    let mut data: Value = serde_json::from_slice(body).ok()?;
    let model = data.get_mut("model")?;
    let original = model.as_str()?;

    let normalized = normalize_model_id(original);
    if normalized == original {
        return None;
    }

    debug!("Normalized model: {} -> {}", original, normalized);
    *model = Value::String(normalized.to_string());
    serde_json::to_vec(&data).ok()
}

/// Rewrite a single SSE line (without its line terminator).
pub fn transform_sse_line(line: &str) -> Cow<'_, str> {
    let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
        return Cow::Borrowed(line);
    };
    if payload.is_empty() || payload == "[DONE]" {
        return Cow::Borrowed(line);
    }

    let Ok(mut data) = serde_json::from_str::<Value>(payload) else {
        return Cow::Borrowed(line);
    };
    if data.get("type").and_then(Value::as_str) != Some("message_start") {
        return Cow::Borrowed(line);
    }
    let Some(model) = data.get_mut("message").and_then(|m| m.get_mut("model")) else {
        return Cow::Borrowed(line);
    };
    let Some(original) = model.as_str() else {
        return Cow::Borrowed(line);
    };

    let normalized = normalize_model_id(original);
    if normalized == original {
        return Cow::Borrowed(line);
    }

    debug!("Normalized SSE model: {} -> {}", original, normalized);
    *model = Value::String(normalized.to_string());
    match serde_json::to_string(&data) {
        Ok(json) => Cow::Owned(format!("{SSE_DATA_PREFIX}{json}")),
        Err(_) => Cow::Borrowed(line),
    }
}

/// Line-by-line SSE rewriter with a single pending partial-line buffer.
///
/// Feed upstream chunks in arrival order with [`SseRewriter::push`]; each call
/// returns the complete (possibly rewritten) lines it finished, each followed
/// by `\n`. [`SseRewriter::finish`] flushes the unterminated tail.
#[derive(Debug, Default)]
pub struct SseRewriter {
    partial: Vec<u8>,
}

impl SseRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        let mut out = Vec::with_capacity(chunk.len() + self.partial.len());
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.partial.is_empty() {
                rewrite_line(line, &mut out);
            } else {
                self.partial.extend_from_slice(line);
                let line = std::mem::take(&mut self.partial);
                rewrite_line(&line, &mut out);
            }
            out.push(b'\n');
        }

        self.partial.extend_from_slice(rest);
        Bytes::from(out)
    }

    /// Flush the held-back tail, if any. No newline is appended.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        let mut out = Vec::with_capacity(line.len());
        rewrite_line(&line, &mut out);
        Some(Bytes::from(out))
    }

    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }
}

/// Append `line` to `out`, rewritten when it is a recognized shape.
fn rewrite_line(line: &[u8], out: &mut Vec<u8>) {
    // Keep CRLF terminators intact.
    let (body, cr) = match line.strip_suffix(b"\r") {
        Some(body) => (body, true),
        None => (line, false),
    };

    match std::str::from_utf8(body) {
        Ok(text) => out.extend_from_slice(transform_sse_line(text).as_bytes()),
        Err(_) => out.extend_from_slice(body),
    }
    if cr {
        out.push(b'\r');
    }
}
