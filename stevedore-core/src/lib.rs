//! Shared data model and error taxonomy for the stevedore workspace.
//!
//! Everything the orchestrator and the CLI exchange lives here: the
//! declarative [`ServiceSpec`], the tracked [`ContainerHandle`] with its
//! lifecycle state machine, and the typed error taxonomy.

pub mod error;
pub mod model;

pub use error::{EngineErrorKind, Error, Result};
pub use model::handle::{ContainerHandle, LifecycleState};
pub use model::probe::HealthProbeResult;
pub use model::spec::{BuildSpec, HealthSpec, PortMapping, RestartPolicy, ServiceSpec};
