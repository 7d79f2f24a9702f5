//! Chunked double-ended queue with fallible growth.
//!
//! Items live in fixed-capacity chunks; the deque is a ring of chunks. The
//! owner pops from the front, thieves take from the back:
//!
//! ```text
//!   front                                              back
//!   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!   │ ░░░░▓▓▓▓ │ → │ ▓▓▓▓▓▓▓▓ │ → │ ▓▓▓░░░░░ │
//!   └──────────┘   └──────────┘   └──────────┘
//!     pop_front        full          push_back / pop_back
//! ```
//!
//! Compared to a single `VecDeque<T>`, growth never copies existing items and
//! each allocation is one chunk, so allocation cost is amortized over
//! `chunk_capacity` pushes. One drained chunk is kept as a spare and reused
//! for the next growth, which removes allocator traffic entirely when the
//! queue oscillates around a chunk boundary.
//!
//! Allocation is fallible: growth uses `try_reserve_exact` and surfaces
//! failure as [`ChunkAllocError`] instead of aborting the process. An
//! optional chunk limit bounds the deque's memory and fails the same way.
//!
//! Not thread-safe; callers wrap it in a lock.

use std::collections::VecDeque;

/// A chunk (or the chunk ring) could not be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to allocate a queue chunk of {items} items")]
pub struct ChunkAllocError {
    /// Capacity of the chunk that failed to allocate.
    pub items: usize,
}

/// Deque of fixed-capacity chunks.
#[derive(Debug)]
pub struct ChunkedDeque<T> {
    chunks: VecDeque<VecDeque<T>>,
    spare: Option<VecDeque<T>>,
    chunk_capacity: usize,
    max_chunks: usize,
    len: usize,
}

impl<T> ChunkedDeque<T> {
    /// Create an empty deque; no chunk is allocated until the first push.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_capacity` is 0.
    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        Self::with_chunk_limit(chunk_capacity, usize::MAX)
    }

    /// Like [`with_chunk_capacity`](Self::with_chunk_capacity), but growth
    /// past `max_chunks` linked chunks fails with [`ChunkAllocError`].
    ///
    /// # Panics
    ///
    /// Panics if `chunk_capacity` or `max_chunks` is 0.
    pub fn with_chunk_limit(chunk_capacity: usize, max_chunks: usize) -> Self {
        assert!(chunk_capacity > 0, "chunk_capacity must be > 0");
        assert!(max_chunks > 0, "max_chunks must be > 0");
        Self {
            chunks: VecDeque::new(),
            spare: None,
            chunk_capacity,
            max_chunks,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Number of chunks currently linked (excluding the spare).
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Append an item at the back.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkAllocError`] if a new chunk is needed and cannot be
    /// allocated. The item is dropped and the deque is unchanged.
    pub fn push_back(&mut self, item: T) -> Result<(), ChunkAllocError> {
        let needs_chunk = self
            .chunks
            .back()
            .map_or(true, |c| c.len() >= self.chunk_capacity);
        if needs_chunk {
            if self.chunks.len() >= self.max_chunks {
                return Err(ChunkAllocError {
                    items: self.chunk_capacity,
                });
            }
            let chunk = self.fresh_chunk()?;
            self.chunks.try_reserve(1).map_err(|_| ChunkAllocError {
                items: self.chunk_capacity,
            })?;
            self.chunks.push_back(chunk);
        }
        if let Some(back) = self.chunks.back_mut() {
            back.push_back(item);
            self.len += 1;
        }
        Ok(())
    }

    /// Remove the oldest item.
    pub fn pop_front(&mut self) -> Option<T> {
        let front = self.chunks.front_mut()?;
        let item = front.pop_front();
        if front.is_empty() && self.chunks.len() > 1 {
            if let Some(chunk) = self.chunks.pop_front() {
                self.recycle(chunk);
            }
        }
        if item.is_some() {
            self.len -= 1;
        }
        item
    }

    /// Remove the newest item.
    pub fn pop_back(&mut self) -> Option<T> {
        let back = self.chunks.back_mut()?;
        let item = back.pop_back();
        if back.is_empty() && self.chunks.len() > 1 {
            if let Some(chunk) = self.chunks.pop_back() {
                self.recycle(chunk);
            }
        }
        if item.is_some() {
            self.len -= 1;
        }
        item
    }

    /// Move up to `max` items (never more than half, rounded up) from the
    /// back into `out`. Returns the number moved.
    pub fn steal_back_into(&mut self, max: usize, out: &mut Vec<T>) -> usize {
        let take = max.min(self.len.div_ceil(2));
        for moved in 0..take {
            match self.pop_back() {
                Some(item) => out.push(item),
                None => return moved,
            }
        }
        take
    }

    fn fresh_chunk(&mut self) -> Result<VecDeque<T>, ChunkAllocError> {
        if let Some(chunk) = self.spare.take() {
            return Ok(chunk);
        }
        let mut chunk = VecDeque::new();
        chunk
            .try_reserve_exact(self.chunk_capacity)
            .map_err(|_| ChunkAllocError {
                items: self.chunk_capacity,
            })?;
        Ok(chunk)
    }

    fn recycle(&mut self, mut chunk: VecDeque<T>) {
        debug_assert!(chunk.is_empty());
        if self.spare.is_none() {
            chunk.clear();
            self.spare = Some(chunk);
        }
    }
}
