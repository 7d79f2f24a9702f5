//! Per-worker work queue.
//!
//! Each worker owns one [`WorkQueue`] and pops from its front. Any worker may
//! push into any queue (round-robin sharing) and idle workers steal batches
//! from the back of a peer's queue.
//!
//! ```text
//!            owner pop ◄── front [ a b c d e f ] back ◄── push (owner or peer)
//!                                          └──┴──► steal_batch (idle peer)
//! ```
//!
//! The deque sits behind a [`SpinLock`]; every critical section is a chunk
//! splice or a single push/pop, far shorter than a context switch. A
//! cache-padded length mirror lets [`is_empty`](WorkQueue::is_empty) answer
//! without touching the lock. The mirror is only advisory: `pop` rechecks
//! under the lock.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::config::SearchConfig;
use crate::stdx::chunked_deque::{ChunkAllocError, ChunkedDeque};
use crate::stdx::spin_lock::SpinLock;
use crate::store::StateId;

/// Items per queue chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 1024;

/// A queue operation could not allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("work queue allocation failed: {0}")]
    AllocFailed(#[from] ChunkAllocError),
}

/// A discovered state waiting to be expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem<L> {
    /// The state to expand.
    pub id: StateId,
    /// The state whose expansion discovered it (`None` for initial states).
    pub parent: Option<StateId>,
    /// Label of the discovering transition (`None` for initial states).
    pub label: Option<L>,
}

impl<L> QueueItem<L> {
    /// Item for an initial state.
    pub fn initial(id: StateId) -> Self {
        Self {
            id,
            parent: None,
            label: None,
        }
    }
}

/// Spin-locked chunked deque with a lock-free emptiness hint.
pub struct WorkQueue<T> {
    items: SpinLock<ChunkedDeque<T>>,
    len: CachePadded<AtomicUsize>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::with_chunk_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        Self::with_limits(chunk_capacity, None)
    }

    /// Queue whose deque may link at most `max_chunks` chunks.
    pub fn with_limits(chunk_capacity: usize, max_chunks: Option<usize>) -> Self {
        let deque =
            ChunkedDeque::with_chunk_limit(chunk_capacity, max_chunks.unwrap_or(usize::MAX));
        Self {
            items: SpinLock::new(deque),
            len: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Queue sized by `cfg.queue_chunk_capacity` and `cfg.queue_chunk_limit`.
    pub(crate) fn for_search(cfg: &SearchConfig) -> Self {
        Self::with_limits(cfg.queue_chunk_capacity, cfg.queue_chunk_limit)
    }

    /// Append an item.
    ///
    /// # Errors
    ///
    /// [`QueueError::AllocFailed`] if a new chunk cannot be allocated; the
    /// item is dropped.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut q = self.items.lock();
        q.push_back(item)?;
        self.len.store(q.len(), Ordering::Release);
        Ok(())
    }

    /// Remove the oldest item.
    pub fn pop(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let mut q = self.items.lock();
        let item = q.pop_front();
        self.len.store(q.len(), Ordering::Release);
        item
    }

    /// Move up to `max` of the newest items (at most half the queue, rounded
    /// up) into `out`. Returns how many were moved.
    pub fn steal_into(&self, max: usize, out: &mut Vec<T>) -> usize {
        if max == 0 || self.is_empty() {
            return 0;
        }
        let mut q = self.items.lock();
        let n = q.steal_back_into(max, out);
        self.len.store(q.len(), Ordering::Release);
        n
    }

    /// Like [`steal_into`](Self::steal_into) but returns a fresh `Vec`.
    pub fn steal_batch(&self, max: usize) -> Vec<T> {
        let mut out = Vec::new();
        self.steal_into(max, &mut out);
        out
    }

    /// Racy emptiness check; may be stale by the time it returns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Racy length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("len", &self.len()).finish()
    }
}
