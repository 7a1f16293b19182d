//! An in-memory engine for tests: records every call and simulates the
//! name-keyed container table the real engine maintains.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stevedore_core::{
    ContainerHandle, EngineErrorKind, Error, LifecycleState, Result, ServiceSpec,
};

use super::{Engine, InspectReport};

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    containers: HashMap<String, InspectReport>,
    fail_runs: u32,
    next_id: u32,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation name, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// How many times `op` was invoked.
    pub fn count(&self, op: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.as_str() == op)
            .count()
    }

    /// Makes the next `n` run calls fail with `RunFailed`.
    pub fn fail_next_runs(&self, n: u32) {
        self.inner.lock().unwrap().fail_runs = n;
    }

    /// Simulates a container crashing behind the orchestrator's back.
    pub fn mark_exited(&self, name: &str) {
        if let Some(report) = self.inner.lock().unwrap().containers.get_mut(name) {
            report.status = "exited".to_string();
        }
    }

    /// Simulates `docker rm` issued by another operator.
    pub fn remove_externally(&self, name: &str) {
        self.inner.lock().unwrap().containers.remove(name);
    }

    fn record(&self, op: &str) {
        self.inner.lock().unwrap().calls.push(op.to_string());
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn build(&self, _spec: &ServiceSpec) -> Result<()> {
        self.record("build");
        Ok(())
    }

    async fn tag(&self, _image: &str, _alias: &str) -> Result<()> {
        self.record("tag");
        Ok(())
    }

    async fn push(&self, _image: &str) -> Result<()> {
        self.record("push");
        Ok(())
    }

    async fn pull(&self, _image: &str) -> Result<()> {
        self.record("pull");
        Ok(())
    }

    async fn run(&self, spec: &ServiceSpec) -> Result<ContainerHandle> {
        self.record("run");
        let mut state = self.inner.lock().unwrap();
        if state.fail_runs > 0 {
            state.fail_runs -= 1;
            return Err(Error::engine(
                EngineErrorKind::RunFailed,
                "simulated run failure",
            ));
        }
        if state
            .containers
            .get(&spec.name)
            .map(InspectReport::is_running)
            .unwrap_or(false)
        {
            return Err(Error::engine(
                EngineErrorKind::RunFailed,
                format!("container name '{}' already in use", spec.name),
            ));
        }
        state.next_id += 1;
        let id = format!("mock-{:08x}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            InspectReport {
                id: id.clone(),
                status: "running".to_string(),
            },
        );
        Ok(ContainerHandle {
            name: spec.name.clone(),
            id: Some(id),
            state: LifecycleState::Running,
        })
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<()> {
        self.record("stop");
        let mut state = self.inner.lock().unwrap();
        match state.containers.get_mut(&handle.name) {
            Some(report) => {
                report.status = "exited".to_string();
                Ok(())
            }
            None => Err(Error::engine(
                EngineErrorKind::NotFound,
                format!("no such container: {}", handle.name),
            )),
        }
    }

    async fn rm(&self, handle: &ContainerHandle) -> Result<()> {
        self.record("rm");
        let mut state = self.inner.lock().unwrap();
        match state.containers.remove(&handle.name) {
            Some(_) => Ok(()),
            None => Err(Error::engine(
                EngineErrorKind::NotFound,
                format!("no such container: {}", handle.name),
            )),
        }
    }

    async fn logs(&self, name: &str, _tail: Option<usize>) -> Result<String> {
        self.record("logs");
        let state = self.inner.lock().unwrap();
        match state.containers.get(name) {
            Some(_) => Ok(format!("logs for {}", name)),
            None => Err(Error::engine(
                EngineErrorKind::NotFound,
                format!("no such container: {}", name),
            )),
        }
    }

    async fn inspect(&self, name: &str) -> Result<Option<InspectReport>> {
        self.record("inspect");
        Ok(self.inner.lock().unwrap().containers.get(name).cloned())
    }
}
