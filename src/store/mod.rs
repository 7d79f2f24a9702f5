//! Concurrent deduplicating state store.
//!
//! The store is the search's global "visited" set and the sole long-term
//! owner of every discovered state. It combines two structures:
//!
//! ```text
//!   try_insert(state)
//!        │
//!        ▼
//!   ┌────────────────────┐  READY(tag, id)  ┌──────────────────────────┐
//!   │ StateTable         │ ───────────────► │ StateArena               │
//!   │ open addressing,   │                  │ append-only segments,    │
//!   │ AtomicU64 cells,   │                  │ write-once slots:        │
//!   │ incremental growth │                  │ (State, parent)          │
//!   └────────────────────┘                  └──────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **At-most-once insertion**: of any number of concurrent inserts of equal
//!   content, exactly one reports `inserted = true`; all return the same id.
//! - **Stable handles**: a [`StateId`] and the `&State` it resolves to stay
//!   valid until the store is dropped, across any number of table resizes.
//! - **Bounded probing**: inserts probe at most a fixed number of cells
//!   before growing the table; the load factor stays at or below 3/4.
//! - **No crash on exhaustion**: allocation failure or the configured state
//!   limit surface as [`StoreError`].

mod arena;
mod state;
mod table;

pub use state::{hash_bytes, State, StateId};

use arena::StateArena;
use table::StateTable;

/// Errors returned by the store. All of them mean the search ran out of a
/// resource; none indicates a logic error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The configured (or addressable) number of states has been stored.
    #[error("state limit of {limit} states reached")]
    Exhausted { limit: usize },

    /// A fallible allocation failed.
    #[error("failed to allocate {bytes} bytes for {what}")]
    AllocFailed { what: &'static str, bytes: usize },

    /// The table cannot grow any further.
    #[error("state table cannot grow beyond {generations} generations")]
    TableFull { generations: usize },
}

/// Store configuration.
///
/// | Knob               | Effect                                              |
/// |--------------------|-----------------------------------------------------|
/// | `initial_capacity` | Cells in the first table generation. Sizing it to   |
/// |                    | the expected state count avoids early migrations.   |
/// | `max_states`       | Hard cap on stored states; hitting it is reported   |
/// |                    | as resource exhaustion.                             |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Initial table size in cells (rounded up to a power of two, minimum 64).
    pub initial_capacity: usize,
    /// Maximum number of states to store, `None` for the addressable maximum.
    pub max_states: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1 << 16,
            max_states: None,
        }
    }
}

/// Result of [`ConcurrentStateStore::try_insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Insert {
    /// Canonical id of the state's content.
    pub id: StateId,
    /// `true` for exactly one insert per distinct content.
    pub inserted: bool,
}

/// Concurrent, append-only set of states. See the module docs.
pub struct ConcurrentStateStore {
    arena: StateArena,
    table: StateTable,
}

impl ConcurrentStateStore {
    /// Create an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AllocFailed`] if the first table generation
    /// cannot be allocated.
    pub fn new(cfg: StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            arena: StateArena::new(cfg.max_states.unwrap_or(usize::MAX)),
            table: StateTable::with_capacity(cfg.initial_capacity)?,
        })
    }

    /// Insert `state` unless equal content is already present.
    ///
    /// `parent` records which state discovered this one; it is kept only for
    /// the winning insert and used by [`trace`](Self::trace).
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; the state is not stored and the store stays usable
    /// for lookups.
    pub fn try_insert(&self, state: State, parent: Option<StateId>) -> Result<Insert, StoreError> {
        let (id, inserted) = self.table.insert(&self.arena, state, parent)?;
        Ok(Insert { id, inserted })
    }

    /// Look up a state without inserting it.
    pub fn contains(&self, state: &State) -> Option<StateId> {
        self.table.find(&self.arena, state)
    }

    /// Resolve an id returned by this store.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not returned by this store.
    #[inline]
    pub fn get(&self, id: StateId) -> &State {
        match self.try_get(id) {
            Some(state) => state,
            None => panic!("{id} is not stored in this state store"),
        }
    }

    /// Resolve an id, returning `None` for ids this store never assigned.
    #[inline]
    pub fn try_get(&self, id: StateId) -> Option<&State> {
        self.arena.get(id).map(|e| &e.state)
    }

    /// The state that first discovered `id`; `None` for initial states.
    pub fn parent(&self, id: StateId) -> Option<StateId> {
        self.arena.get(id).and_then(|e| e.parent)
    }

    /// Path of ids from an initial state to `id` (inclusive), following the
    /// parent links recorded at insertion.
    pub fn trace(&self, id: StateId) -> Vec<StateId> {
        let mut path = vec![id];
        let mut cur = id;
        while let Some(p) = self.parent(cur) {
            // Parents are inserted before their children, so a cycle here
            // would mean a corrupted arena.
            assert!(path.len() <= self.len(), "parent links form a cycle at {cur}");
            path.push(p);
            cur = p;
        }
        path.reverse();
        path
    }

    /// Number of stored states.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell count of the current table generation.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Number of completed table growths.
    pub fn generation(&self) -> usize {
        self.table.generation()
    }

    /// Maximum number of states this store accepts.
    pub fn max_states(&self) -> usize {
        self.arena.limit()
    }

    /// Iterate stored states in id order.
    ///
    /// Intended for use after a search; while inserts are running, states
    /// whose slot is not yet written are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, &State)> + '_ {
        (0..self.arena.reserved()).filter_map(move |i| {
            let id = StateId::from_raw(i as u32);
            self.try_get(id).map(|s| (id, s))
        })
    }
}

impl std::fmt::Debug for ConcurrentStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentStateStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("generation", &self.generation())
            .finish()
    }
}
