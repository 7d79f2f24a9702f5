//! Small transition systems shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reach_rs::{Generator, GeneratorError, State};

pub fn u32_state(n: u32) -> State {
    State::new(n.to_le_bytes().to_vec())
}

pub fn u32_of(s: &State) -> u32 {
    u32::from_le_bytes(s.bytes().try_into().expect("4-byte state"))
}

/// Explicit graph over `u32` nodes.
pub struct Graph {
    pub edges: Vec<Vec<u32>>,
    pub roots: Vec<u32>,
    pub errors: Vec<u32>,
    pub accepting: Vec<u32>,
}

impl Graph {
    pub fn new(edges: Vec<Vec<u32>>) -> Self {
        Self {
            edges,
            roots: vec![0],
            errors: Vec::new(),
            accepting: Vec::new(),
        }
    }

    /// `0 -> 1 -> ... -> n-1`; the last node is a deadlock.
    pub fn chain(n: u32) -> Self {
        Self::new(
            (0..n)
                .map(|i| if i + 1 < n { vec![i + 1] } else { vec![] })
                .collect(),
        )
    }
}

impl Generator for Graph {
    type Label = usize;

    fn initial_states(&self) -> Vec<State> {
        self.roots.iter().map(|&r| u32_state(r)).collect()
    }

    fn successors(&self, s: &State, out: &mut Vec<(State, usize)>) -> Result<(), GeneratorError> {
        let node = u32_of(s) as usize;
        let edges = self
            .edges
            .get(node)
            .ok_or_else(|| GeneratorError::new(format!("unknown node {node}")))?;
        out.extend(edges.iter().enumerate().map(|(i, &m)| (u32_state(m), i)));
        Ok(())
    }

    fn is_error(&self, s: &State) -> bool {
        self.errors.contains(&u32_of(s))
    }

    fn is_accepting(&self, s: &State) -> bool {
        self.accepting.contains(&u32_of(s))
    }
}

/// `w x h` lattice moving right or down; `(w-1, h-1)` is the only deadlock.
/// With `err_mod: Some(m)`, cells where `(x * y) % m == 1` are error states;
/// `None` has no error states.
pub struct Grid {
    pub w: u16,
    pub h: u16,
    pub err_mod: Option<u32>,
}

impl Grid {
    pub fn encode(x: u16, y: u16) -> State {
        let mut b = Vec::with_capacity(4);
        b.extend_from_slice(&x.to_le_bytes());
        b.extend_from_slice(&y.to_le_bytes());
        State::new(b)
    }

    pub fn decode(s: &State) -> (u16, u16) {
        let b = s.bytes();
        (
            u16::from_le_bytes([b[0], b[1]]),
            u16::from_le_bytes([b[2], b[3]]),
        )
    }

    pub fn expected_transitions(&self) -> u64 {
        let (w, h) = (u64::from(self.w), u64::from(self.h));
        (w - 1) * h + w * (h - 1)
    }

    pub fn expected_errors(&self) -> u64 {
        let Some(m) = self.err_mod else {
            return 0;
        };
        let mut n = 0;
        for x in 0..u32::from(self.w) {
            for y in 0..u32::from(self.h) {
                if (x * y) % m == 1 {
                    n += 1;
                }
            }
        }
        n
    }
}

impl Generator for Grid {
    type Label = char;

    fn initial_states(&self) -> Vec<State> {
        vec![Self::encode(0, 0)]
    }

    fn successors(&self, s: &State, out: &mut Vec<(State, char)>) -> Result<(), GeneratorError> {
        let (x, y) = Self::decode(s);
        if x + 1 < self.w {
            out.push((Self::encode(x + 1, y), 'r'));
        }
        if y + 1 < self.h {
            out.push((Self::encode(x, y + 1), 'd'));
        }
        Ok(())
    }

    fn is_error(&self, s: &State) -> bool {
        let (x, y) = Self::decode(s);
        self.err_mod
            .is_some_and(|m| (u32::from(x) * u32::from(y)) % m == 1)
    }
}

/// Wraps a generator and records how often each state was expanded.
pub struct Counting<G> {
    pub inner: G,
    pub calls: Mutex<HashMap<Vec<u8>, u32>>,
}

impl<G> Counting<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<G: Generator> Generator for Counting<G> {
    type Label = G::Label;

    fn initial_states(&self) -> Vec<State> {
        self.inner.initial_states()
    }

    fn successors(
        &self,
        s: &State,
        out: &mut Vec<(State, G::Label)>,
    ) -> Result<(), GeneratorError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(s.bytes().to_vec())
            .or_default() += 1;
        self.inner.successors(s, out)
    }

    fn is_error(&self, s: &State) -> bool {
        self.inner.is_error(s)
    }

    fn is_accepting(&self, s: &State) -> bool {
        self.inner.is_accepting(s)
    }
}

/// How [`Faulty`] misbehaves at its trigger state.
#[derive(Clone, Copy, Debug)]
pub enum Fault {
    Error,
    Panic,
}

/// A grid whose generator fails when expanding `(at, at)`.
pub struct Faulty {
    pub grid: Grid,
    pub at: u16,
    pub fault: Fault,
}

impl Generator for Faulty {
    type Label = char;

    fn initial_states(&self) -> Vec<State> {
        self.grid.initial_states()
    }

    fn successors(&self, s: &State, out: &mut Vec<(State, char)>) -> Result<(), GeneratorError> {
        if Grid::decode(s) == (self.at, self.at) {
            match self.fault {
                Fault::Error => return Err(GeneratorError::new("injected failure")),
                Fault::Panic => panic!("injected generator panic"),
            }
        }
        self.grid.successors(s, out)
    }
}

/// Unbounded binary tree over `u64`, slowed down so it never finishes.
pub struct Endless {
    pub delay: Duration,
    pub expanded: AtomicU64,
}

impl Endless {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            expanded: AtomicU64::new(0),
        }
    }
}

impl Generator for Endless {
    type Label = ();

    fn initial_states(&self) -> Vec<State> {
        vec![State::new(0u64.to_le_bytes().to_vec())]
    }

    fn successors(&self, s: &State, out: &mut Vec<(State, ())>) -> Result<(), GeneratorError> {
        self.expanded.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(self.delay);
        let n = u64::from_le_bytes(s.bytes().try_into().expect("8-byte state"));
        for child in [2 * n + 1, 2 * n + 2] {
            out.push((State::new(child.to_le_bytes().to_vec()), ()));
        }
        Ok(())
    }
}
