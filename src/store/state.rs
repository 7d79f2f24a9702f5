//! States and state handles.
//!
//! A [`State`] is an opaque, immutable byte string plus a memoized 64-bit
//! hash. The engine never looks inside the bytes: the generator produces
//! them, the store deduplicates them, and the generator interprets them
//! again when asked for successors.
//!
//! A [`StateId`] is the dense integer handle the store assigns to each
//! distinct state. Handles are what flows through queues and statistics;
//! the bytes themselves are owned by the store for the whole search.

use std::fmt;
use std::hash::{Hash, Hasher};

use ahash::RandomState;

/// Fixed seeds so hashes (and thus table layouts) are reproducible across
/// runs and processes.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hash a state's bytes with the engine's fixed-seed hasher.
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let [a, b, c, d] = HASH_SEEDS;
    RandomState::with_seeds(a, b, c, d).hash_one(bytes)
}

/// Opaque immutable state: bytes plus precomputed hash.
#[derive(Clone)]
pub struct State {
    bytes: Box<[u8]>,
    hash: u64,
}

impl State {
    /// Build a state and hash its bytes.
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        let bytes = bytes.into();
        let hash = hash_bytes(&bytes);
        Self { bytes, hash }
    }

    /// Build a state with a hash computed by the caller.
    ///
    /// The caller must use the same hash function for every state of a
    /// search; equal bytes with different hashes would be stored twice.
    pub fn with_hash(bytes: impl Into<Box<[u8]>>, hash: u64) -> Self {
        Self {
            bytes: bytes.into(),
            hash,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for State {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        let shown = &self.bytes[..self.bytes.len().min(PREVIEW)];
        f.debug_struct("State")
            .field("len", &self.bytes.len())
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("bytes", &shown)
            .finish()
    }
}

impl From<Vec<u8>> for State {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for State {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

/// Dense handle of a stored state, assigned in insertion order.
///
/// `u32::MAX` is reserved as a sentinel and never assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u32);

impl StateId {
    /// Largest id the store will ever assign.
    pub const MAX: StateId = StateId(u32::MAX - 1);

    pub(crate) const SENTINEL: u32 = u32::MAX;

    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        debug_assert!(raw != Self::SENTINEL);
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}
