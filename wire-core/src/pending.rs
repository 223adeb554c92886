//! Outstanding read requests.
//!
//! Reads are fulfilled strictly in submission order. A request either
//! asks for an exact byte count or for "whatever is buffered"; the head of
//! the queue blocks everyone behind it until it can be satisfied.
//!
//! The queue is generic over the completion handle `H` so that it stays
//! free of any runtime: `dbwire-client` stores oneshot senders here.
//!
//! # Length semantics
//!
//! Each request is sliced individually. An exact request receives exactly
//! `requested` bytes even when more are buffered; the surplus stays for the
//! next request. An "any" request receives the entire backlog present when
//! it reaches the head of the queue.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::accumulator::ByteAccumulator;

/// A single outstanding read.
#[derive(Debug)]
pub struct PendingRead<H> {
    /// Exact byte count wanted, or `None` for any available bytes.
    pub requested: Option<usize>,
    /// Completion handle for the caller waiting on this read.
    pub handle: H,
}

impl<H> PendingRead<H> {
    /// Check if the accumulator can satisfy this request right now.
    pub fn is_satisfiable(&self, acc: &ByteAccumulator) -> bool {
        satisfiable(self.requested, acc)
    }
}

/// Check if a request for `requested` bytes can be served from `acc`.
///
/// A request for zero bytes is always satisfiable.
pub fn satisfiable(requested: Option<usize>, acc: &ByteAccumulator) -> bool {
    match requested {
        None => !acc.is_empty(),
        Some(n) => acc.len() >= n,
    }
}

/// FIFO queue of outstanding reads.
#[derive(Debug)]
pub struct PendingReadQueue<H> {
    queue: VecDeque<PendingRead<H>>,
}

impl<H> Default for PendingReadQueue<H> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<H> PendingReadQueue<H> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read to the back of the queue.
    pub fn push(&mut self, requested: Option<usize>, handle: H) {
        self.queue.push_back(PendingRead { requested, handle });
    }

    /// Number of outstanding reads.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if no reads are outstanding.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if the head of the queue can be served from `acc`.
    pub fn head_ready(&self, acc: &ByteAccumulator) -> bool {
        self.queue
            .front()
            .is_some_and(|pending| pending.is_satisfiable(acc))
    }

    /// Serve queued reads from `acc` in order.
    ///
    /// Stops at the first request that cannot be satisfied yet. `deliver`
    /// hands the bytes to the waiting caller; if it gives them back (the
    /// caller is gone) they are returned to the front of the accumulator
    /// and the next request is considered.
    ///
    /// Returns the number of reads that were delivered.
    pub fn drain<F>(&mut self, acc: &mut ByteAccumulator, mut deliver: F) -> usize
    where
        F: FnMut(H, Bytes) -> Result<(), Bytes>,
    {
        let mut delivered = 0;
        while self.head_ready(acc) {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };
            let bytes = acc.read(pending.requested);
            match deliver(pending.handle, bytes) {
                Ok(()) => delivered += 1,
                Err(returned) => acc.unread(returned),
            }
        }
        delivered
    }

    /// Drop every read whose caller has gone away.
    ///
    /// Returns the number of reads removed.
    pub fn prune<F>(&mut self, mut abandoned: F) -> usize
    where
        F: FnMut(&H) -> bool,
    {
        let before = self.queue.len();
        self.queue.retain(|pending| !abandoned(&pending.handle));
        before - self.queue.len()
    }

    /// Empty the queue, returning every handle in submission order.
    ///
    /// Used to fan out a single error or close to all waiting callers.
    pub fn reject_all(&mut self) -> Vec<H> {
        self.queue.drain(..).map(|pending| pending.handle).collect()
    }
}
