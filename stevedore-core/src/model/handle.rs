use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Position of a container in the deployment pipeline.
///
/// The derived ordering follows the pipeline: transitions are only legal
/// forward, except the failure loop `stopped -> running` taken when the
/// orchestrator restarts a container that exited during the health window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Absent,
    Built,
    Tagged,
    Pushed,
    Running,
    Healthy,
    Stopping,
    Stopped,
    Removed,
}

impl LifecycleState {
    /// True for states in which the engine holds a live container.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Healthy)
    }

    /// True once the container can no longer be running.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Removed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Absent => "absent",
            Self::Built => "built",
            Self::Tagged => "tagged",
            Self::Pushed => "pushed",
            Self::Running => "running",
            Self::Healthy => "healthy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// The tracked reference to one container instance.
///
/// The engine assigns the id when `run` succeeds; until then only the name
/// is known. At most one handle may hold a given name in `running` or later
/// state at a time, mirroring the engine's name uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub name: String,
    pub id: Option<String>,
    pub state: LifecycleState,
}

impl ContainerHandle {
    /// A fresh handle for a container the engine knows nothing about yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            state: LifecycleState::Absent,
        }
    }

    /// Advances the lifecycle state, rejecting illegal transitions.
    pub fn advance(&mut self, to: LifecycleState) -> Result<()> {
        let legal = to > self.state
            || (self.state == LifecycleState::Stopped && to == LifecycleState::Running);
        if !legal {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_legal() {
        let mut handle = ContainerHandle::new("web");
        for state in [
            LifecycleState::Built,
            LifecycleState::Tagged,
            LifecycleState::Pushed,
            LifecycleState::Running,
            LifecycleState::Healthy,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
            LifecycleState::Removed,
        ] {
            handle.advance(state).unwrap();
            assert_eq!(handle.state, state);
        }
    }

    #[test]
    fn skipping_states_forward_is_legal() {
        // Teardown of a never-pushed container jumps straight to stopping.
        let mut handle = ContainerHandle::new("web");
        handle.advance(LifecycleState::Stopping).unwrap();
        handle.advance(LifecycleState::Removed).unwrap();
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut handle = ContainerHandle::new("web");
        handle.advance(LifecycleState::Healthy).unwrap();
        let err = handle.advance(LifecycleState::Built).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(handle.state, LifecycleState::Healthy);
    }

    #[test]
    fn stopped_container_may_restart() {
        let mut handle = ContainerHandle::new("web");
        handle.advance(LifecycleState::Running).unwrap();
        handle.advance(LifecycleState::Stopped).unwrap();
        handle.advance(LifecycleState::Running).unwrap();
        assert!(handle.state.is_active());
    }

    #[test]
    fn removed_container_may_not_restart() {
        let mut handle = ContainerHandle::new("web");
        handle.advance(LifecycleState::Removed).unwrap();
        assert!(handle.advance(LifecycleState::Running).is_err());
    }

    #[test]
    fn active_and_terminal_predicates() {
        assert!(LifecycleState::Running.is_active());
        assert!(LifecycleState::Healthy.is_active());
        assert!(!LifecycleState::Stopping.is_active());
        assert!(LifecycleState::Stopped.is_terminal());
        assert!(LifecycleState::Removed.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
    }
}
