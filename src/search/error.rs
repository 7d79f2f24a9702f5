//! Search failures and stop reasons.

use std::fmt;

use super::generator::GeneratorError;
use super::queue::QueueError;
use crate::store::{StateId, StoreError};

/// A failure that ends the search early.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SearchError {
    /// The state store ran out of memory or hit `max_states`.
    #[error("resource exhausted: {0}")]
    StoreExhausted(#[from] StoreError),

    /// A work queue could not grow.
    #[error("resource exhausted: {0}")]
    QueueExhausted(#[from] QueueError),

    /// The generator returned an error or panicked while expanding `state`.
    #[error("generator failed while expanding {state}: {source}")]
    Generator {
        state: StateId,
        #[source]
        source: GeneratorError,
    },

    /// The generator panicked in `initial_states`.
    #[error("generator failed to produce initial states: {0}")]
    InitialStates(#[source] GeneratorError),

    /// A worker thread panicked outside the generator.
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    /// A worker thread could not be started.
    #[error("failed to spawn worker {worker}: {message}")]
    Spawn { worker: usize, message: String },
}

impl SearchError {
    /// `true` for store or queue exhaustion.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::StoreExhausted(_) | Self::QueueExhausted(_))
    }
}

/// Kind of property violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// The generator classified a reachable state as an error state.
    Error,
    /// A reachable state has no successors.
    Deadlock,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error state"),
            Self::Deadlock => f.write_str("deadlock"),
        }
    }
}

/// Why a search did not run to completion.
#[derive(Clone, Debug)]
pub enum StopReason {
    /// [`StopHandle::request_stop`](super::StopHandle::request_stop) was called.
    Requested,
    /// `SearchConfig::time_limit` elapsed.
    TimeLimit,
    /// A violation was found with the matching `stop_on_*` knob set.
    PropertyViolation(ViolationKind),
    /// The search failed.
    Failed(SearchError),
}

impl StopReason {
    /// The failure, if the search failed.
    pub fn error(&self) -> Option<&SearchError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("stop requested"),
            Self::TimeLimit => f.write_str("time limit reached"),
            Self::PropertyViolation(kind) => write!(f, "{kind} found"),
            Self::Failed(e) => write!(f, "search failed: {e}"),
        }
    }
}
