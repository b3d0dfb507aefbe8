//! Byte ring buffer
//!
//! Fixed-capacity FIFO between a producer copying user PCM in and the
//! interrupt handler copying it out to DMA pages. A ring with capacity 0 is
//! "uninitialized": the stream sizes it lazily on first use.

use alloc::vec::Vec;

use crate::drivers::hda::{HdaError, Result};

pub struct RingBuffer {
    buf: Vec<u8>,
    /// Read position
    head: usize,
    /// Unread bytes
    len: usize,
}

impl RingBuffer {
    pub const fn new() -> Self {
        Self { buf: Vec::new(), head: 0, len: 0 }
    }

    pub fn is_initialized(&self) -> bool {
        !self.buf.is_empty()
    }

    /// (Re)allocate with `capacity` bytes, discarding any content
    pub fn init(&mut self, capacity: usize) -> Result<()> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|_| HdaError::NoMemory)?;
        buf.resize(capacity, 0);
        self.buf = buf;
        self.head = 0;
        self.len = 0;
        Ok(())
    }

    /// Free the storage; the ring is uninitialized again
    pub fn release(&mut self) {
        self.buf = Vec::new();
        self.head = 0;
        self.len = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as much of `data` as fits; returns bytes taken
    pub fn write(&mut self, data: &[u8]) -> usize {
        let cap = self.capacity();
        let n = data.len().min(self.free());
        if n == 0 {
            return 0;
        }
        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.len += n;
        n
    }

    /// Remove up to `n` bytes from the front
    ///
    /// The removed bytes are returned as up to two slices (the second is
    /// non-empty only when the span wraps).
    pub fn consume(&mut self, n: usize) -> (&[u8], &[u8]) {
        let n = n.min(self.len);
        if n == 0 {
            return (&[], &[]);
        }
        let cap = self.capacity();
        let start = self.head;
        let first = n.min(cap - start);
        self.head = (start + n) % cap;
        self.len -= n;
        (&self.buf[start..start + first], &self.buf[..n - first])
    }

    /// Discard unread content, keeping the allocation
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
