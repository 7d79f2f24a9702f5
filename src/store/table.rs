//! Concurrent open-addressing table of [`StateId`]s with incremental growth.
//!
//! # Cell encoding
//!
//! Every cell is one `AtomicU64`:
//!
//! ```text
//!   63            33 32                1  0
//!  ┌────────────────┬──────────────────┬───┐
//!  │   tag (31 bit) │   id (32 bit)    │ R │
//!  └────────────────┴──────────────────┴───┘
//!
//!   EMPTY     = 0
//!   BUSY      = tag << 33                  claimed, id not yet published
//!   READY     = tag << 33 | id << 1 | 1
//!   TOMBSTONE = 1                          claim abandoned (insert failed)
//!   MOVED     = u64::MAX                   sealed by migration
//! ```
//!
//! The tag is the top 31 bits of the state hash with its highest bit forced
//! on, so a real tag is never zero and `BUSY` never equals `EMPTY`. `MOVED`
//! cannot collide with a `READY` word because its id field is the reserved
//! sentinel.
//!
//! # Insert protocol
//!
//! ```text
//!   probe from home slot (linear)
//!     EMPTY            → CAS to BUSY(tag) ─┬─ table changed? → MOVED, retry in new generation
//!                                          └─ reserve id, write arena, store READY
//!     BUSY(same tag)   → wait until READY / TOMBSTONE / MOVED, then re-examine
//!     READY(same tag)  → compare bytes; equal → found
//!     MOVED            → growth in progress, retry in new generation
//!     anything else    → next slot
//! ```
//!
//! Because cells never return to `EMPTY`, two inserts of equal content walk
//! the same probe prefix and meet at the same cell; exactly one CAS wins.
//!
//! # Growth
//!
//! The table is a list of generations, each twice the size of the previous.
//! A grower takes the `growing` flag, allocates the next generation, bumps
//! `current`, and publishes the old table as a set of segments. Every thread
//! that touches the store while `growing` is set helps migrate segments.
//! Migration seals each old cell with `MOVED` (waiting out `BUSY` cells), so
//! no write can land in the old generation after its cell was visited. No
//! insert or lookup runs against the new generation before all segments
//! are done, which rules out a state being inserted fresh into the new
//! generation while its old copy is still waiting to be migrated.
//!
//! Old generations are kept until the store is dropped; a concurrent reader
//! may still be probing one.
//!
//! # Memory ordering
//!
//! The claim (`CAS EMPTY→BUSY`) followed by a load of `current` on the
//! inserter side, and the store of `current` followed by a load of the cell on
//! the migrator side, form a store-buffering pattern; both sides use
//! `SeqCst` so at least one observes the other.

use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

use crossbeam_utils::Backoff;

use super::arena::StateArena;
use super::state::{State, StateId};
use super::StoreError;

const EMPTY: u64 = 0;
const TOMBSTONE: u64 = 1;
const MOVED: u64 = u64::MAX;
const READY_BIT: u64 = 1;
const TAG_SHIFT: u32 = 33;
const TAG_HIGH_BIT: u64 = 1 << 30;
const ID_MASK: u64 = (1 << 32) - 1;

/// Probe budget for a normal insert; running past it triggers growth.
const MAX_PROBES: usize = 1 << 10;
/// Cells migrated per unit of helping work.
const SEGMENT_CELLS: usize = 1 << 14;
/// Smallest generation, in cells.
pub(crate) const MIN_CAPACITY: usize = 64;
/// Generations available before the table refuses to grow.
pub(crate) const MAX_GENERATIONS: usize = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cell {
    Empty,
    Busy { tag: u64 },
    Ready { tag: u64, id: StateId },
    Tombstone,
    Moved,
}

#[inline]
fn tag_of(hash: u64) -> u64 {
    (hash >> TAG_SHIFT) | TAG_HIGH_BIT
}

#[inline]
fn busy_word(tag: u64) -> u64 {
    tag << TAG_SHIFT
}

#[inline]
fn ready_word(tag: u64, id: StateId) -> u64 {
    (tag << TAG_SHIFT) | (u64::from(id.raw()) << 1) | READY_BIT
}

#[inline]
fn decode(word: u64) -> Cell {
    match word {
        EMPTY => Cell::Empty,
        TOMBSTONE => Cell::Tombstone,
        MOVED => Cell::Moved,
        w if w & READY_BIT == 0 => Cell::Busy { tag: w >> TAG_SHIFT },
        w => Cell::Ready {
            tag: w >> TAG_SHIFT,
            id: StateId::from_raw(((w >> 1) & ID_MASK) as u32),
        },
    }
}

type Generation = Box<[AtomicU64]>;

enum Probe<'a> {
    Found(StateId),
    Claimed(&'a AtomicU64),
    NotFound,
    NoSpace,
    Growing,
}

/// Growable lock-free set of state ids, keyed by the states' contents.
pub(crate) struct StateTable {
    generations: [OnceLock<Generation>; MAX_GENERATIONS],
    current: AtomicUsize,
    growing: AtomicBool,
    available_segments: AtomicIsize,
    done_segments: AtomicUsize,
    total_segments: AtomicUsize,
}

fn alloc_generation(cells: usize) -> Result<Generation, StoreError> {
    let mut v: Vec<AtomicU64> = Vec::new();
    v.try_reserve_exact(cells)
        .map_err(|_| StoreError::AllocFailed {
            what: "table generation",
            bytes: cells * std::mem::size_of::<AtomicU64>(),
        })?;
    v.resize_with(cells, || AtomicU64::new(EMPTY));
    Ok(v.into_boxed_slice())
}

impl StateTable {
    /// Create a table whose first generation holds `capacity` cells
    /// (rounded up to a power of two, at least [`MIN_CAPACITY`]).
    pub(crate) fn with_capacity(capacity: usize) -> Result<Self, StoreError> {
        let cells = capacity.max(MIN_CAPACITY).next_power_of_two();
        let table = Self {
            generations: std::array::from_fn(|_| OnceLock::new()),
            current: AtomicUsize::new(0),
            growing: AtomicBool::new(false),
            available_segments: AtomicIsize::new(0),
            done_segments: AtomicUsize::new(0),
            total_segments: AtomicUsize::new(0),
        };
        let _ = table.generations[0].set(alloc_generation(cells)?);
        Ok(table)
    }

    /// Index of the current generation.
    #[inline]
    pub(crate) fn generation(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Cell count of the current generation.
    pub(crate) fn capacity(&self) -> usize {
        self.gen(self.generation()).len()
    }

    #[inline]
    fn gen(&self, g: usize) -> &Generation {
        self.generations[g]
            .get()
            .expect("generation published before `current` points at it")
    }

    #[inline]
    fn changed(&self, g: usize) -> bool {
        self.current.load(Ordering::SeqCst) != g
    }

    /// Insert `state` unless an equal state is present.
    ///
    /// Returns the canonical id and whether this call inserted it.
    pub(crate) fn insert(
        &self,
        arena: &StateArena,
        state: State,
        parent: Option<StateId>,
    ) -> Result<(StateId, bool), StoreError> {
        let hash = state.hash();
        loop {
            let g = self.settle(arena);

            // Keep the load factor at or below 3/4.
            let cells = self.gen(g).len();
            if arena.reserved() >= cells - cells / 4 {
                self.grow(arena, g + 1)?;
                continue;
            }

            match self.probe(arena, g, &state, hash, true) {
                Probe::Found(id) => return Ok((id, false)),
                Probe::Claimed(cell) => {
                    let tag = tag_of(hash);
                    return match arena.push(state, parent) {
                        Ok(id) => {
                            cell.store(ready_word(tag, id), Ordering::SeqCst);
                            Ok((id, true))
                        }
                        Err(e) => {
                            cell.store(TOMBSTONE, Ordering::SeqCst);
                            Err(e)
                        }
                    };
                }
                Probe::NoSpace => self.grow(arena, g + 1)?,
                Probe::Growing | Probe::NotFound => {}
            }
        }
    }

    /// Look up a state without inserting it.
    pub(crate) fn find(&self, arena: &StateArena, state: &State) -> Option<StateId> {
        loop {
            let g = self.settle(arena);
            match self.probe(arena, g, state, state.hash(), false) {
                Probe::Found(id) => return Some(id),
                Probe::NotFound | Probe::NoSpace => return None,
                Probe::Growing | Probe::Claimed(_) => {}
            }
        }
    }

    /// Wait out (and help with) any migration in progress, then return a
    /// generation index that was current once no migration was running.
    fn settle(&self, arena: &StateArena) -> usize {
        let backoff = Backoff::new();
        loop {
            // Read `current` before `growing`: a bump is always preceded by
            // setting `growing`, so a post-bump read sees the flag.
            let g = self.current.load(Ordering::SeqCst);
            if !self.growing.load(Ordering::SeqCst) {
                if !self.changed(g) {
                    return g;
                }
                continue;
            }
            if !self.migrate_segment(arena) {
                backoff.snooze();
            }
        }
    }

    fn probe<'a>(
        &'a self,
        arena: &StateArena,
        g: usize,
        state: &State,
        hash: u64,
        claim: bool,
    ) -> Probe<'a> {
        let table = self.gen(g);
        let mask = table.len() - 1;
        let home = hash as usize & mask;
        let tag = tag_of(hash);
        let limit = if claim { MAX_PROBES.min(table.len()) } else { table.len() };
        let backoff = Backoff::new();

        for i in 0..limit {
            if self.changed(g) {
                return Probe::Growing;
            }
            let cell = &table[(home + i) & mask];
            let mut word = cell.load(Ordering::SeqCst);
            loop {
                match decode(word) {
                    Cell::Empty if !claim => return Probe::NotFound,
                    Cell::Empty => {
                        match cell.compare_exchange(
                            EMPTY,
                            busy_word(tag),
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        ) {
                            Ok(_) => {
                                if self.changed(g) {
                                    cell.store(MOVED, Ordering::SeqCst);
                                    return Probe::Growing;
                                }
                                return Probe::Claimed(cell);
                            }
                            Err(actual) => word = actual,
                        }
                    }
                    Cell::Busy { tag: t } if t == tag => {
                        backoff.snooze();
                        word = cell.load(Ordering::SeqCst);
                    }
                    Cell::Ready { tag: t, id } if t == tag => {
                        let entry = arena
                            .get(id)
                            .expect("published id is present in the arena");
                        if entry.state == *state {
                            return Probe::Found(id);
                        }
                        break;
                    }
                    Cell::Moved => return Probe::Growing,
                    Cell::Busy { .. } | Cell::Ready { .. } | Cell::Tombstone => break,
                }
            }
        }

        if claim {
            Probe::NoSpace
        } else {
            Probe::NotFound
        }
    }

    /// Grow to generation `target` unless someone already did.
    fn grow(&self, arena: &StateArena, target: usize) -> Result<(), StoreError> {
        if target >= MAX_GENERATIONS {
            return Err(StoreError::TableFull {
                generations: MAX_GENERATIONS,
            });
        }
        if self.generation() >= target {
            return Ok(());
        }

        let backoff = Backoff::new();
        while self
            .growing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if !self.migrate_segment(arena) {
                backoff.snooze();
            }
        }

        if self.generation() >= target {
            self.growing.store(false, Ordering::SeqCst);
            return Ok(());
        }

        let old_cells = self.gen(target - 1).len();
        let new = match alloc_generation(old_cells * 2) {
            Ok(new) => new,
            Err(e) => {
                self.growing.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let _ = self.generations[target].set(new);

        let segments = old_cells.div_ceil(SEGMENT_CELLS);
        self.done_segments.store(0, Ordering::SeqCst);
        self.total_segments.store(segments, Ordering::SeqCst);
        self.current.store(target, Ordering::SeqCst);
        // Published last: a helper that grabs a segment sees the new `current`.
        self.available_segments
            .store(segments as isize, Ordering::SeqCst);

        tracing::debug!(
            generation = target,
            cells = old_cells * 2,
            segments,
            "state table growing"
        );

        while self.migrate_segment(arena) {}
        Ok(())
    }

    /// Migrate one segment of the previous generation, if any is left.
    ///
    /// The thread finishing the last segment clears `growing`.
    fn migrate_segment(&self, arena: &StateArena) -> bool {
        if self.available_segments.load(Ordering::SeqCst) <= 0 {
            return false;
        }
        let segment = self.available_segments.fetch_sub(1, Ordering::SeqCst) - 1;
        if segment < 0 {
            return false;
        }
        let segment = segment as usize;

        let g = self.current.load(Ordering::SeqCst);
        let old = self.gen(g - 1);
        let new = self.gen(g);
        let start = segment * SEGMENT_CELLS;
        let end = (start + SEGMENT_CELLS).min(old.len());
        let backoff = Backoff::new();

        for cell in &old[start..end] {
            loop {
                let word = cell.load(Ordering::SeqCst);
                match decode(word) {
                    Cell::Empty => {
                        if cell
                            .compare_exchange(EMPTY, MOVED, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            break;
                        }
                    }
                    Cell::Busy { .. } => backoff.snooze(),
                    Cell::Ready { id, .. } => {
                        let hash = arena
                            .get(id)
                            .expect("published id is present in the arena")
                            .state
                            .hash();
                        place(new, hash, word);
                        cell.store(MOVED, Ordering::SeqCst);
                        break;
                    }
                    Cell::Tombstone => {
                        cell.store(MOVED, Ordering::SeqCst);
                        break;
                    }
                    Cell::Moved => break,
                }
            }
        }

        let total = self.total_segments.load(Ordering::SeqCst);
        if self.done_segments.fetch_add(1, Ordering::SeqCst) + 1 == total {
            self.growing.store(false, Ordering::SeqCst);
        }
        true
    }
}

/// Put a migrated READY word into the first empty cell of its probe run.
///
/// The target generation is at most 3/8 full, so an empty cell exists and
/// linear probing reaches it.
fn place(table: &[AtomicU64], hash: u64, word: u64) {
    let mask = table.len() - 1;
    let home = hash as usize & mask;
    for i in 0..table.len() {
        let cell = &table[(home + i) & mask];
        if cell
            .compare_exchange(EMPTY, word, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return;
        }
    }
    unreachable!("migration target generation has no empty cell");
}
