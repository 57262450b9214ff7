//! Size-bounded packet buffer

use bytes::{Bytes, BytesMut};

/// Accumulates newline-terminated lines up to a maximum packet size.
///
/// A line that alone exceeds the limit is still accepted into an empty
/// frame and sent oversize; it is never split.
#[derive(Debug)]
pub struct TransportFrame {
    buf: BytesMut,
    lines: usize,
    max_size: usize,
}

impl TransportFrame {
    pub fn new(max_size: usize) -> Self {
        TransportFrame {
            buf: BytesMut::with_capacity(max_size),
            lines: 0,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Lines currently buffered
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// True when appending `line_len` bytes requires flushing first
    pub fn would_overflow(&self, line_len: usize) -> bool {
        !self.is_empty() && self.buf.len() + line_len > self.max_size
    }

    pub fn push(&mut self, line: &str) {
        self.buf.extend_from_slice(line.as_bytes());
        self.lines += 1;
    }

    /// Take the buffered bytes, leaving the frame empty
    pub fn take(&mut self) -> (Bytes, usize) {
        let lines = std::mem::take(&mut self.lines);
        (self.buf.split().freeze(), lines)
    }
}
