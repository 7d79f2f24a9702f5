//! The transition-system interface the engine explores.

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

use crate::store::State;

/// A generator failed to produce successors for one state.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{msg}")]
pub struct GeneratorError {
    msg: String,
    #[source]
    source: Option<Arc<dyn Error + Send + Sync + 'static>>,
}

impl GeneratorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            source: None,
        }
    }

    /// Wrap an underlying error.
    pub fn with_source(msg: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            msg: msg.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Convert a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::new(format!("generator panicked: {detail}"))
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }
}

/// An implicit transition system.
///
/// The engine calls [`initial_states`](Generator::initial_states) once and
/// [`successors`](Generator::successors) exactly once per distinct reachable
/// state, from many threads at once. Implementations must be deterministic:
/// the same state must always yield the same successors and classification.
///
/// Labels travel with queued states for provenance only; the engine never
/// inspects them.
pub trait Generator: Sync {
    type Label: Send;

    /// States the search starts from.
    fn initial_states(&self) -> Vec<State>;

    /// Append every successor of `state` with its transition label to `out`.
    ///
    /// `out` is empty on entry. Leaving it empty marks `state` as a deadlock.
    fn successors(
        &self,
        state: &State,
        out: &mut Vec<(State, Self::Label)>,
    ) -> Result<(), GeneratorError>;

    /// `true` if reaching `state` violates the safety property.
    fn is_error(&self, _state: &State) -> bool {
        false
    }

    /// `true` if `state` is accepting.
    fn is_accepting(&self, _state: &State) -> bool {
        false
    }
}

impl<G: Generator + ?Sized> Generator for &G {
    type Label = G::Label;

    fn initial_states(&self) -> Vec<State> {
        (**self).initial_states()
    }

    fn successors(
        &self,
        state: &State,
        out: &mut Vec<(State, Self::Label)>,
    ) -> Result<(), GeneratorError> {
        (**self).successors(state, out)
    }

    fn is_error(&self, state: &State) -> bool {
        (**self).is_error(state)
    }

    fn is_accepting(&self, state: &State) -> bool {
        (**self).is_accepting(state)
    }
}
