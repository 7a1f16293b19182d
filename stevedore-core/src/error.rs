use std::fmt;
use thiserror::Error;

use crate::model::handle::LifecycleState;

/// Which runtime-client operation failed.
///
/// Every operation gets its own kind so the CLI can map failures to
/// distinct exit codes. `NotFound` is special: teardown paths treat it as
/// success because the container is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    BuildFailed,
    TagFailed,
    PushFailed,
    PullFailed,
    RunFailed,
    StopFailed,
    RemoveFailed,
    InspectFailed,
    LogsFailed,
    NotFound,
    /// The engine binary itself could not be invoked.
    Spawn,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BuildFailed => "build failed",
            Self::TagFailed => "tag failed",
            Self::PushFailed => "push failed",
            Self::PullFailed => "pull failed",
            Self::RunFailed => "run failed",
            Self::StopFailed => "stop failed",
            Self::RemoveFailed => "remove failed",
            Self::InspectFailed => "inspect failed",
            Self::LogsFailed => "logs failed",
            Self::NotFound => "not found",
            Self::Spawn => "engine unavailable",
        };
        f.write_str(label)
    }
}

/// Global error type for stevedore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing service spec fields. Fatal, never retried.
    #[error("invalid service spec: {0}")]
    Config(String),

    /// A runtime-client operation failed. Build/tag/push are fatal;
    /// run failures are retried by the orchestrator up to its budget.
    #[error("engine {kind}: {message}")]
    Engine {
        kind: EngineErrorKind,
        message: String,
    },

    /// The health probe budget was exhausted.
    #[error("health check failed: {0}")]
    HealthCheck(String),

    /// An illegal lifecycle transition was requested.
    #[error("illegal lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The state tracker file could not be read or written.
    #[error("state tracking error: {0}")]
    State(String),

    /// Underlying IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds an [`Error::Engine`] with the given kind.
    pub fn engine(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self::Engine {
            kind,
            message: message.into(),
        }
    }

    /// True when the error means "the container is already gone".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Engine {
                kind: EngineErrorKind::NotFound,
                ..
            }
        )
    }

    /// The engine error kind, if this is an engine failure.
    pub fn engine_kind(&self) -> Option<EngineErrorKind> {
        match self {
            Self::Engine { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// A specialized Result type for stevedore operations.
pub type Result<T> = std::result::Result<T, Error>;
