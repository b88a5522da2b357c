//! Model State Machine
//!
//! Lifecycle of the single model a worker process owns.
//!
//! ```text
//! Unloaded ──→ Loading ──→ Ready ──→ Unloading ──→ Unloaded (re-load allowed)
//!     ↑           │          │           │
//!     └───────────┘          ↓           ↓
//!    (LOAD failed)        Faulted ←──────┘
//! ```
//!
//! `Faulted` is terminal for the process: only an external restart recovers.

use std::fmt;

/// Model lifecycle state (lightweight, no heavy data).
///
/// The backend itself lives in the `ModelWorker`; this only tracks the phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    /// No model held. Initial state.
    Unloaded,

    /// Backend variant selected, weights being loaded
    Loading,

    /// Accepting PREDICT
    Ready,

    /// Backend teardown in progress
    Unloading,

    /// Teardown or initialization could not complete cleanly
    Faulted(String),
}

impl ModelState {
    pub fn can_transition_to(&self, target: &ModelState) -> bool {
        matches!(
            (self, target),
            (ModelState::Unloaded, ModelState::Loading)
                | (ModelState::Loading, ModelState::Ready)
                // LOAD failure rolls back; nothing was constructed
                | (ModelState::Loading, ModelState::Unloaded)
                | (ModelState::Loading, ModelState::Faulted(_))
                | (ModelState::Ready, ModelState::Unloading)
                | (ModelState::Ready, ModelState::Faulted(_))
                | (ModelState::Unloading, ModelState::Unloaded)
                | (ModelState::Unloading, ModelState::Faulted(_))
        )
    }

    /// Attempt to transition to `target`. Returns `Err` if invalid.
    pub fn transition(&mut self, target: ModelState) -> Result<(), StateTransitionError> {
        if !self.can_transition_to(&target) {
            return Err(StateTransitionError {
                from: self.clone(),
                to: target,
            });
        }
        *self = target;
        Ok(())
    }

    pub fn can_predict(&self) -> bool {
        matches!(self, ModelState::Ready)
    }

    pub fn can_load(&self) -> bool {
        matches!(self, ModelState::Unloaded)
    }

    pub fn can_unload(&self) -> bool {
        matches!(self, ModelState::Ready)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, ModelState::Faulted(_))
    }

    pub fn label(&self) -> &str {
        match self {
            ModelState::Unloaded => "Unloaded",
            ModelState::Loading => "Loading",
            ModelState::Ready => "Ready",
            ModelState::Unloading => "Unloading",
            ModelState::Faulted(_) => "Faulted",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelState::Faulted(reason) => write!(f, "Faulted({})", reason),
            other => write!(f, "{}", other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransitionError {
    pub from: ModelState,
    pub to: ModelState,
}

impl fmt::Display for StateTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for StateTransitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_with_reload() {
        let mut state = ModelState::Unloaded;

        for target in [
            ModelState::Loading,
            ModelState::Ready,
            ModelState::Unloading,
            ModelState::Unloaded,
            ModelState::Loading,
            ModelState::Ready,
        ] {
            state.transition(target.clone()).unwrap();
            assert_eq!(state, target);
        }
        assert!(state.can_predict());
    }

    #[test]
    fn test_failed_load_rolls_back() {
        let mut state = ModelState::Unloaded;
        state.transition(ModelState::Loading).unwrap();
        state.transition(ModelState::Unloaded).unwrap();
        assert!(state.can_load());
    }

    #[test]
    fn test_faulted_is_terminal() {
        let mut state = ModelState::Ready;
        state.transition(ModelState::Unloading).unwrap();
        state
            .transition(ModelState::Faulted("teardown failed".into()))
            .unwrap();

        assert!(state.is_faulted());
        assert!(!state.can_load());
        assert!(!state.can_predict());
        assert!(!state.can_unload());
        for target in [
            ModelState::Unloaded,
            ModelState::Loading,
            ModelState::Ready,
            ModelState::Unloading,
        ] {
            assert!(!state.can_transition_to(&target));
        }
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = ModelState::Unloaded;
        let err = state.transition(ModelState::Ready).unwrap_err();

        assert_eq!(err.from, ModelState::Unloaded);
        assert_eq!(err.to, ModelState::Ready);
        assert!(err.to_string().contains("invalid state transition"));
        // Unchanged on failure
        assert_eq!(state, ModelState::Unloaded);
    }

    #[test]
    fn test_unloaded_cannot_fault() {
        assert!(!ModelState::Unloaded.can_transition_to(&ModelState::Faulted("x".into())));
    }

    #[test]
    fn test_display() {
        assert_eq!(ModelState::Ready.to_string(), "Ready");
        assert_eq!(
            ModelState::Faulted("device lost".into()).to_string(),
            "Faulted(device lost)"
        );
    }
}
