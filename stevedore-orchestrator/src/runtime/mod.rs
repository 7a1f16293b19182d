//! The runtime client: a thin interface over the container engine CLI.

mod docker;
#[cfg(any(test, feature = "test-utils"))]
mod mock;

pub use docker::DockerEngine;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stevedore_core::{ContainerHandle, Result, ServiceSpec};

/// The engine's live view of one container, from `inspect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectReport {
    pub id: String,
    /// Engine status string, e.g. `running` or `exited`.
    pub status: String,
}

impl InspectReport {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// The abstraction over the external container engine.
///
/// Every operation is one blocking call to the engine; failures surface as
/// `Error::Engine` with an operation-specific kind. No retries here: retry
/// policy belongs to the orchestrator.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Builds the local image `spec.image_ref()` from the spec's build
    /// section.
    async fn build(&self, spec: &ServiceSpec) -> Result<()>;

    /// Tags `image` with `alias`.
    async fn tag(&self, image: &str, alias: &str) -> Result<()>;

    /// Pushes `image` to its registry.
    async fn push(&self, image: &str) -> Result<()>;

    /// Pulls `image` from its registry.
    async fn pull(&self, image: &str) -> Result<()>;

    /// Starts a detached container and returns its handle in `running`
    /// state with the engine-assigned id.
    async fn run(&self, spec: &ServiceSpec) -> Result<ContainerHandle>;

    /// Stops the container. `NotFound` when the engine does not know it.
    async fn stop(&self, handle: &ContainerHandle) -> Result<()>;

    /// Removes the container. `NotFound` when the engine does not know it.
    async fn rm(&self, handle: &ContainerHandle) -> Result<()>;

    /// Fetches container logs, optionally limited to the last `tail` lines.
    async fn logs(&self, name: &str, tail: Option<usize>) -> Result<String>;

    /// Looks the container up by name. `Ok(None)` when absent.
    async fn inspect(&self, name: &str) -> Result<Option<InspectReport>>;
}
