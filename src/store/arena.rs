//! Append-only segmented arena indexed by [`StateId`].
//!
//! # Layout
//!
//! ```text
//!   segment 0: BASE slots         ids [0, BASE)
//!   segment 1: 2·BASE slots       ids [BASE, 3·BASE)
//!   segment k: BASE·2^k slots     ids [BASE·(2^k − 1), BASE·(2^(k+1) − 1))
//! ```
//!
//! Segments never move once allocated, so `&State` borrows handed out by
//! [`StateArena::get`] stay valid for the arena's lifetime even while other
//! threads keep appending. Every slot is write-once.
//!
//! # Concurrency
//!
//! - Id reservation is a single `fetch_add`.
//! - Segment allocation is serialized by a mutex and happens once per
//!   segment (23 times over the arena's whole life).
//! - A slot is written exactly once, by the thread that reserved its id,
//!   before that id is published anywhere; readers only ever look up ids
//!   they obtained from a published table cell.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use super::state::{State, StateId};
use super::StoreError;

const BASE_SHIFT: u32 = 10;
const BASE: usize = 1 << BASE_SHIFT;

/// Enough segments to cover every assignable `StateId`.
const SEGMENTS: usize = 23;

const _: () = assert!(
    (BASE << SEGMENTS) - BASE > u32::MAX as usize,
    "segments must cover the full StateId range"
);

/// One stored state plus its discovery provenance.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) state: State,
    pub(crate) parent: Option<StateId>,
}

type Segment = Box<[OnceLock<Entry>]>;

pub(crate) struct StateArena {
    segments: [OnceLock<Segment>; SEGMENTS],
    /// Next id to hand out. May run past `limit` after exhaustion.
    next: AtomicUsize,
    /// Slots fully written.
    committed: AtomicUsize,
    limit: usize,
    alloc_lock: Mutex<()>,
}

#[inline]
fn locate(index: usize) -> (usize, usize) {
    let v = index + BASE;
    let seg = (usize::BITS - 1 - v.leading_zeros() - BASE_SHIFT) as usize;
    (seg, v - (BASE << seg))
}

impl StateArena {
    /// Create an empty arena that refuses to store more than `limit` states.
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            segments: std::array::from_fn(|_| OnceLock::new()),
            next: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
            limit: limit.min(StateId::MAX.index() + 1),
            alloc_lock: Mutex::new(()),
        }
    }

    /// Append a state and return its id.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Exhausted`] once `limit` ids have been handed out.
    /// - [`StoreError::AllocFailed`] if a segment cannot be allocated.
    pub(crate) fn push(&self, state: State, parent: Option<StateId>) -> Result<StateId, StoreError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        if index >= self.limit {
            return Err(StoreError::Exhausted { limit: self.limit });
        }

        let (seg, off) = locate(index);
        let segment = self.segment(seg)?;
        let fresh = segment[off].set(Entry { state, parent }).is_ok();
        assert!(fresh, "arena slot {index} written twice");
        self.committed.fetch_add(1, Ordering::Release);

        Ok(StateId::from_raw(index as u32))
    }

    /// Look up a written slot.
    #[inline]
    pub(crate) fn get(&self, id: StateId) -> Option<&Entry> {
        let (seg, off) = locate(id.index());
        self.segments.get(seg)?.get()?.get(off)?.get()
    }

    /// Number of fully written slots.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    /// Number of ids reserved so far (written or in flight), capped at the limit.
    #[inline]
    pub(crate) fn reserved(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.limit)
    }

    #[inline]
    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    fn segment(&self, seg: usize) -> Result<&Segment, StoreError> {
        if let Some(s) = self.segments[seg].get() {
            return Ok(s);
        }

        // Poisoning only means another thread panicked mid-allocation; the
        // OnceLock below is still consistent.
        let _guard = self
            .alloc_lock
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if let Some(s) = self.segments[seg].get() {
            return Ok(s);
        }

        let slots = BASE << seg;
        let mut v: Vec<OnceLock<Entry>> = Vec::new();
        v.try_reserve_exact(slots)
            .map_err(|_| StoreError::AllocFailed {
                what: "arena segment",
                bytes: slots * std::mem::size_of::<OnceLock<Entry>>(),
            })?;
        v.resize_with(slots, OnceLock::new);

        tracing::debug!(segment = seg, slots, "arena segment allocated");
        Ok(self.segments[seg].get_or_init(|| v.into_boxed_slice()))
    }
}
