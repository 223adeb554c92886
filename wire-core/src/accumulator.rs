//! Inbound byte accumulator.
//!
//! Chunks are stored in arrival order and only concatenated when a caller
//! consumes them. Appending never touches bytes that are already buffered,
//! so a growing backlog costs O(1) per inbound chunk instead of a full
//! re-copy.
//!
//! Reads come in two flavours:
//! - `read(None)` takes the whole backlog
//! - `read(Some(n))` takes exactly `n` bytes, splitting the chunk that
//!   straddles the boundary and keeping its suffix as the new head

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Append-only, order-preserving byte buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteAccumulator {
    /// Buffered chunks, oldest first. Never contains an empty chunk.
    chunks: VecDeque<Bytes>,
    /// Sum of all chunk lengths.
    total_len: usize,
}

impl ByteAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the back of the buffer.
    pub fn push(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.total_len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Put a chunk back at the front of the buffer.
    ///
    /// Used when bytes were extracted for a reader that went away before
    /// they could be handed over.
    pub fn unread(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.total_len += chunk.len();
        self.chunks.push_front(chunk);
    }

    /// Extract bytes from the front of the buffer.
    ///
    /// `None`, or a length at least as large as the backlog, drains
    /// everything. Otherwise exactly `n` bytes are returned and the rest
    /// stays buffered. Never blocks: an empty buffer yields an empty result.
    pub fn read(&mut self, n: Option<usize>) -> Bytes {
        if self.total_len == 0 {
            return Bytes::new();
        }

        match n {
            Some(0) => Bytes::new(),
            Some(n) if n < self.total_len => self.read_exact(n),
            _ => self.read_all(),
        }
    }

    fn read_all(&mut self) -> Bytes {
        self.total_len = 0;
        if self.chunks.len() == 1 {
            return self.chunks.pop_front().unwrap_or_default();
        }

        let mut out = BytesMut::with_capacity(self.chunks.iter().map(Bytes::len).sum());
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }

    fn read_exact(&mut self, n: usize) -> Bytes {
        self.total_len -= n;

        // Head chunk covers the request on its own: split without copying.
        if let Some(head) = self.chunks.front_mut() {
            if head.len() > n {
                return head.split_to(n);
            }
            if head.len() == n {
                return self.chunks.pop_front().unwrap_or_default();
            }
        }

        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let Some(head) = self.chunks.front_mut() else {
                break;
            };
            if head.len() <= remaining {
                remaining -= head.len();
                out.extend_from_slice(head);
                self.chunks.pop_front();
            } else {
                out.extend_from_slice(&head.split_to(remaining));
                remaining = 0;
            }
        }
        out.freeze()
    }

    /// Total number of buffered bytes.
    pub fn len(&self) -> usize {
        self.total_len
    }

    /// Check if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Number of chunks currently held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_len = 0;
    }
}
