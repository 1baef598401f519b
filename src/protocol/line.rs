//! Incremental newline framer for the serial byte stream.
//!
//! The bridge microcontroller forwards each radio packet as one `\n`
//! terminated ASCII line. Reads arrive in arbitrary chunks, so this decoder
//! accumulates bytes and yields whole lines once their terminator shows up.
//! Invalid UTF-8 is dropped byte-wise rather than failing the line, and a
//! runaway line without a terminator is discarded to bound memory.
use crate::metrics;
use bytes::{Buf, BytesMut};

/// Longest accepted line in bytes, terminator excluded.
pub const MAX_LINE_LEN: usize = 1024;

#[derive(Debug)]
pub struct LineDecoder {
    buf: BytesMut,
    /// Set after an oversize line was dropped; bytes up to the next newline
    /// belong to that line and are skipped too.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_LINE_LEN),
            discarding: false,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete, trimmed, non-empty line if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > MAX_LINE_LEN {
                    if !self.discarding {
                        metrics::inc_oversize_dropped();
                    }
                    self.buf.clear();
                    self.discarding = true;
                }
                return None;
            };
            let raw = self.buf.split_to(pos);
            self.buf.advance(1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if raw.len() > MAX_LINE_LEN {
                metrics::inc_oversize_dropped();
                continue;
            }
            if let Some(line) = decode_line(&raw) {
                return Some(line);
            }
        }
    }

    /// Push a chunk and collect every line it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.push(data);
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Forget any partial line; called when a new connection opens.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let cleaned: String = text
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
