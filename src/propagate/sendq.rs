//! Per-connection output queue with a hard byte ceiling.

use bytes::{Bytes, BytesMut};

/// The line would push the queue past its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendQExceeded {
    pub queued: usize,
    pub ceiling: usize,
}

#[derive(Debug)]
pub struct SendQueue {
    buf: BytesMut,
    ceiling: usize,
    /// The writer could not take more; retry on the next writable signal.
    blocked: bool,
}

impl SendQueue {
    pub fn new(ceiling: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            ceiling,
            blocked: false,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn set_ceiling(&mut self, ceiling: usize) {
        self.ceiling = ceiling;
    }

    /// Append `line` plus CRLF. Nothing is queued on overflow.
    pub fn push_line(&mut self, line: &str) -> Result<(), SendQExceeded> {
        let needed = line.len() + 2;
        if self.buf.len() + needed > self.ceiling {
            return Err(SendQExceeded {
                queued: self.buf.len(),
                ceiling: self.ceiling,
            });
        }
        self.buf.reserve(needed);
        self.buf.extend_from_slice(line.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Take everything queued so far.
    pub fn take(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }

    /// Put back a chunk the writer refused, ahead of anything newer.
    pub fn requeue_front(&mut self, chunk: Bytes) {
        let mut merged = BytesMut::with_capacity(chunk.len() + self.buf.len());
        merged.extend_from_slice(&chunk);
        merged.extend_from_slice(&self.buf);
        self.buf = merged;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    /// Queued text split into lines; used by tests and debugging.
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf)
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Drop the queued bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
