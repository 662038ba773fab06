//! Incremental server-sent-events decoder.
//!
//! Bytes arrive from the HTTP body in arbitrary chunks; [`SseDecoder`] buffers
//! partial lines and yields a [`RawFrame`] for every blank-line-terminated
//! block. Comment lines (`: heartbeat`) produce no frame but are counted so
//! the transport can treat them as liveness signals.

use crate::models::{RawFrame, DEFAULT_EVENT};

/// Maximum size of a single buffered block (16 MiB).
pub const MAX_FRAME_BYTES: usize = 16 << 20;

/// Result of feeding a chunk into the decoder.
#[derive(Debug, Default)]
pub struct DecodedChunk {
    pub frames: Vec<RawFrame>,
    /// Comment lines seen in this chunk (server heartbeats).
    pub comments: usize,
    /// Set when a block exceeded [`MAX_FRAME_BYTES`] and was discarded.
    pub overflowed: bool,
}

#[derive(Debug, Default)]
struct PendingBlock {
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
    compressed: Option<bool>,
    retry_ms: Option<u64>,
    bytes: usize,
}

impl PendingBlock {
    fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.event.is_none()
            && self.data.is_empty()
            && self.compressed.is_none()
            && self.retry_ms.is_none()
    }

    fn take_frame(&mut self) -> Option<RawFrame> {
        let block = std::mem::take(self);
        if block.is_empty() {
            return None;
        }
        Some(RawFrame {
            id: block.id,
            event: block.event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: block.data.join("\n"),
            compressed: block.compressed,
            retry_ms: block.retry_ms,
        })
    }
}

/// Line-oriented SSE parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: PendingBlock,
    seen_first_line: bool,
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes and collect every completed frame.
    pub fn feed(&mut self, chunk: &[u8]) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let mut line = &self.buffer[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;
            self.process_line(&line, &mut out);
        }
        self.buffer.drain(..start);

        if self.buffer.len() + self.pending.bytes > MAX_FRAME_BYTES {
            log::warn!(
                "[skyclust-link] SSE block exceeds {} bytes, discarding",
                MAX_FRAME_BYTES
            );
            self.buffer.clear();
            self.pending = PendingBlock::default();
            self.discarding = true;
            out.overflowed = true;
        }

        out
    }

    /// Reset at end of stream. An unterminated trailing block is incomplete
    /// and is dropped; returns `true` if one was.
    pub fn finish(&mut self) -> bool {
        let dropped = !self.buffer.is_empty() || !self.pending.is_empty();
        *self = Self::default();
        dropped
    }

    fn process_line(&mut self, line: &str, out: &mut DecodedChunk) {
        let line = if !self.seen_first_line {
            self.seen_first_line = true;
            line.strip_prefix('\u{feff}').unwrap_or(line)
        } else {
            line
        };

        if line.is_empty() {
            if self.discarding {
                self.discarding = false;
                self.pending = PendingBlock::default();
                return;
            }
            if let Some(frame) = self.pending.take_frame() {
                out.frames.push(frame);
            }
            return;
        }

        if self.discarding {
            return;
        }

        if line.starts_with(':') {
            out.comments += 1;
            return;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            },
            None => (line, ""),
        };

        self.pending.bytes += value.len();
        match field {
            "id" => {
                if !value.contains('\0') {
                    self.pending.id = Some(value.to_string());
                }
            },
            "event" => self.pending.event = Some(value.to_string()),
            "data" => self.pending.data.push(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.pending.retry_ms = Some(ms);
                }
            },
            "compressed" => {
                self.pending.compressed = Some(value.trim().eq_ignore_ascii_case("true"));
            },
            other => {
                log::debug!("[skyclust-link] Ignoring unknown SSE field '{}'", other);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"id: 7\nevent: vm-status\ndata: {\"a\":1}\n\n");
        assert_eq!(out.frames.len(), 1);
        let frame = &out.frames[0];
        assert_eq!(frame.id.as_deref(), Some("7"));
        assert_eq!(frame.event, "vm-status");
        assert_eq!(frame.data, "{\"a\":1}");
        assert_eq!(frame.compressed, None);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: vm-sta").frames.is_empty());
        assert!(decoder.feed(b"tus\ndata: hel").frames.is_empty());
        let out = decoder.feed(b"lo\r\n\r\n");
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].event, "vm-status");
        assert_eq!(out.frames[0].data, "hello");
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(out.frames[0].data, "line1\nline2");
        assert_eq!(out.frames[0].event, DEFAULT_EVENT);
    }

    #[test]
    fn test_heartbeat_comment_and_retry() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"retry: 3000\n\n: heartbeat\n\n");
        assert_eq!(out.comments, 1);
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.frames[0].retry_ms, Some(3000));
        assert!(!out.frames[0].has_data());
    }

    #[test]
    fn test_compressed_flag() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"event: x\ncompressed: true\ndata: AAAA\n\n");
        assert_eq!(out.frames[0].compressed, Some(true));
    }

    #[test]
    fn test_invalid_retry_ignored() {
        let mut decoder = SseDecoder::new();
        let out = decoder.feed(b"retry: soon\ndata: x\n\n");
        assert_eq!(out.frames[0].retry_ms, None);
    }

    #[test]
    fn test_unterminated_block_dropped_on_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: partial\n").frames.is_empty());
        assert!(decoder.finish());

        // Fresh state afterwards: the next stream starts clean.
        assert!(!decoder.finish());
        let decoded = decoder.feed(b"data: next\n\n");
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.frames[0].data, "next");
    }
}
