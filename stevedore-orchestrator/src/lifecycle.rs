//! The lifecycle orchestrator: sequences build → tag → push → run, polls
//! the health endpoint and decides success or failure.
//!
//! Every state transition is persisted to the tracker before the next
//! engine call, so an interrupted deploy can always be torn down from the
//! state file alone.

use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::time::sleep;

use stevedore_core::{
    ContainerHandle, EngineErrorKind, Error, LifecycleState, Result, ServiceSpec,
};

use crate::health::{ProbeWindow, Prober};
use crate::runtime::Engine;
use crate::state::StateTracker;

pub struct Orchestrator<E: Engine, P: Prober> {
    engine: E,
    prober: P,
    tracker: StateTracker,
}

impl<E: Engine, P: Prober> Orchestrator<E, P> {
    pub fn new(engine: E, prober: P, tracker: StateTracker) -> Self {
        Self {
            engine,
            prober,
            tracker,
        }
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Runs the full deploy pipeline for `spec`.
    ///
    /// Idempotent: when the tracker already holds a live instance of this
    /// service and the engine confirms it, no pipeline step runs at all.
    pub async fn deploy(&mut self, spec: &ServiceSpec) -> Result<ContainerHandle> {
        if let Some(existing) = self.reuse_existing(spec).await? {
            return Ok(existing);
        }

        let image = spec.image_ref();
        let mut handle = ContainerHandle::new(&spec.name);

        if spec.build.is_some() {
            info!("Deploy [{}]: building {}", spec.name, image);
            self.engine.build(spec).await?;
        } else {
            info!("Deploy [{}]: no build section, pulling {}", spec.name, image);
            self.engine.pull(&image).await?;
        }
        self.advance(&mut handle, LifecycleState::Built, &image)?;

        match spec.registry_ref() {
            Some(alias) => {
                self.engine.tag(&image, &alias).await?;
                self.advance(&mut handle, LifecycleState::Tagged, &image)?;

                if spec.push {
                    info!("Deploy [{}]: pushing {}", spec.name, alias);
                    self.engine.push(&alias).await?;
                } else {
                    info!("Deploy [{}]: push disabled, skipping", spec.name);
                }
                self.advance(&mut handle, LifecycleState::Pushed, &image)?;
            }
            None => {
                info!(
                    "Deploy [{}]: no registry configured, skipping tag/push",
                    spec.name
                );
                self.advance(&mut handle, LifecycleState::Tagged, &image)?;
                self.advance(&mut handle, LifecycleState::Pushed, &image)?;
            }
        }

        // The run retry budget is shared between initial start failures and
        // containers that exit during the health window.
        let mut retries_left = spec.health.run_retries;
        self.start_container(spec, &mut handle, &mut retries_left)
            .await?;
        self.await_healthy(spec, &mut handle, &mut retries_left)
            .await?;

        Ok(handle)
    }

    /// Stops and removes the tracked container. Idempotent: a container the
    /// engine no longer knows counts as success.
    pub async fn teardown(&mut self, name: &str) -> Result<()> {
        let (mut handle, image) = match self.tracker.get(name) {
            Some(record) => (record.handle(), record.image.clone()),
            // Never tracked (or state file lost): still try, the engine may
            // know the name.
            None => (ContainerHandle::new(name), String::new()),
        };

        if handle.state.is_terminal() && self.engine.inspect(name).await?.is_none() {
            info!("Teardown [{}]: already gone", name);
            return Ok(());
        }

        self.finish_teardown(&mut handle, &image).await
    }

    /// The tracked lifecycle state, reconciled against the live engine view.
    pub async fn status(&mut self, name: &str) -> Result<LifecycleState> {
        let tracked = self
            .tracker
            .get(name)
            .map(|record| (record.state, record.image.clone()));
        let live = self.engine.inspect(name).await?;
        let live_running = live.as_ref().map(|r| r.is_running()).unwrap_or(false);

        match tracked {
            None if live_running => Ok(LifecycleState::Running),
            None if live.is_some() => Ok(LifecycleState::Stopped),
            None => Ok(LifecycleState::Absent),
            Some((state, image)) => {
                if state.is_active() && !live_running {
                    // Stale record: the engine lost the container since we
                    // last looked. Reconcile before reporting.
                    warn!("Status [{}]: tracked as {} but not running", name, state);
                    let mut handle = self.tracker.get(name).map(|r| r.handle()).unwrap();
                    self.advance(&mut handle, LifecycleState::Stopped, &image)?;
                    return Ok(LifecycleState::Stopped);
                }
                if state == LifecycleState::Removed && live.is_none() {
                    return Ok(LifecycleState::Absent);
                }
                Ok(state)
            }
        }
    }

    /// Pass-through to the runtime client's log fetch.
    pub async fn logs(&mut self, name: &str, tail: Option<usize>) -> Result<String> {
        self.engine.logs(name, tail).await
    }

    /// Checks whether a tracked live instance can be reused. Returns the
    /// existing handle if so; reconciles stale records and returns `None`
    /// when the pipeline has to run.
    async fn reuse_existing(&mut self, spec: &ServiceSpec) -> Result<Option<ContainerHandle>> {
        let record = match self.tracker.get(&spec.name) {
            Some(record) if record.state.is_active() => record.clone(),
            _ => return Ok(None),
        };

        match self.engine.inspect(&spec.name).await? {
            Some(report) if report.is_running() => {
                info!(
                    "Deploy [{}]: already {}, reusing existing container",
                    spec.name, record.state
                );
                Ok(Some(record.handle()))
            }
            _ => {
                warn!(
                    "Deploy [{}]: tracked as {} but the engine lost it, redeploying",
                    spec.name, record.state
                );
                let mut handle = record.handle();
                self.advance(&mut handle, LifecycleState::Stopped, &record.image)?;
                Ok(None)
            }
        }
    }

    /// Starts the container, retrying `RunFailed` up to the shared budget.
    /// Leftover exited containers holding our name are removed first.
    async fn start_container(
        &mut self,
        spec: &ServiceSpec,
        handle: &mut ContainerHandle,
        retries_left: &mut u32,
    ) -> Result<()> {
        let image = spec.image_ref();

        if let Some(report) = self.engine.inspect(&spec.name).await? {
            if !report.is_running() {
                info!(
                    "Deploy [{}]: removing leftover container {}",
                    spec.name,
                    short_id(&report.id)
                );
                let leftover = ContainerHandle {
                    name: spec.name.clone(),
                    id: Some(report.id),
                    state: handle.state,
                };
                tolerate_not_found(self.engine.rm(&leftover).await)?;
            }
        }

        loop {
            match self.engine.run(spec).await {
                Ok(started) => {
                    handle.id = started.id;
                    self.advance(handle, LifecycleState::Running, &image)?;
                    return Ok(());
                }
                Err(e)
                    if e.engine_kind() == Some(EngineErrorKind::RunFailed)
                        && *retries_left > 0 =>
                {
                    *retries_left -= 1;
                    warn!(
                        "Deploy [{}]: {} ({} retries left)",
                        spec.name, e, retries_left
                    );
                    sleep(retry_pause(spec)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The health-poll loop: grace period, then one probe per interval with
    /// a doubling backoff while failing. Budget exhaustion tears the
    /// container down exactly once and surfaces `HealthCheck`.
    async fn await_healthy(
        &mut self,
        spec: &ServiceSpec,
        handle: &mut ContainerHandle,
        retries_left: &mut u32,
    ) -> Result<()> {
        let image = spec.image_ref();
        let health = spec.health.clone();

        let url = match health.url(spec) {
            Some(url) => url,
            None => {
                info!(
                    "Deploy [{}]: no probe target, marking healthy on start",
                    spec.name
                );
                self.advance(handle, LifecycleState::Healthy, &image)?;
                return Ok(());
            }
        };

        info!(
            "Deploy [{}]: probing {} (grace {}s, interval {}s, budget {})",
            spec.name, url, health.grace_secs, health.interval_secs, health.failure_budget
        );
        sleep(health.grace()).await;

        let mut window = ProbeWindow::new(health.failure_budget.max(1) as usize);
        loop {
            // A container that died is a run failure, not a probe failure:
            // it goes back through the restart budget, not the teardown path.
            let alive = self
                .engine
                .inspect(&spec.name)
                .await?
                .map(|report| report.is_running())
                .unwrap_or(false);
            if !alive {
                self.advance(handle, LifecycleState::Stopped, &image)?;
                if *retries_left == 0 {
                    error!(
                        "Deploy [{}]: container keeps exiting, giving up",
                        spec.name
                    );
                    self.finish_teardown(handle, &image).await?;
                    return Err(Error::engine(
                        EngineErrorKind::RunFailed,
                        format!("container '{}' exited during the health window", spec.name),
                    ));
                }
                *retries_left -= 1;
                warn!("Deploy [{}]: container exited, restarting", spec.name);
                self.start_container(spec, handle, retries_left).await?;
                sleep(health.grace()).await;
                continue;
            }

            let result = self.prober.probe(&url, health.timeout()).await;
            if result.success {
                info!(
                    "Deploy [{}]: healthy after {} ms",
                    spec.name,
                    result.latency.as_millis()
                );
                self.advance(handle, LifecycleState::Healthy, &image)?;
                return Ok(());
            }

            window.record(result);
            let failures = window.consecutive_failures();
            warn!(
                "Deploy [{}]: probe failed ({}/{})",
                spec.name, failures, health.failure_budget
            );
            if failures >= health.failure_budget {
                error!(
                    "Deploy [{}]: health budget exhausted, tearing down",
                    spec.name
                );
                self.finish_teardown(handle, &image).await?;
                return Err(Error::HealthCheck(format!(
                    "'{}' failed {} consecutive probes against {}",
                    spec.name, failures, url
                )));
            }

            sleep(window.next_delay(health.timeout(), health.interval())).await;
        }
    }

    /// stop → rm, tolerating already-stopped/already-removed. Transitions
    /// are guarded so a handle past `stopping` only moves further forward.
    async fn finish_teardown(&mut self, handle: &mut ContainerHandle, image: &str) -> Result<()> {
        if handle.state < LifecycleState::Stopping {
            self.advance(handle, LifecycleState::Stopping, image)?;
        }

        info!("Teardown [{}]: stopping", handle.name);
        tolerate_not_found(self.engine.stop(handle).await)?;
        if handle.state < LifecycleState::Stopped {
            self.advance(handle, LifecycleState::Stopped, image)?;
        }

        info!("Teardown [{}]: removing", handle.name);
        tolerate_not_found(self.engine.rm(handle).await)?;
        if handle.state < LifecycleState::Removed {
            self.advance(handle, LifecycleState::Removed, image)?;
        }

        Ok(())
    }

    /// Advances the handle and persists the record before anything else
    /// happens. This ordering is what makes interrupted deploys safe.
    fn advance(
        &mut self,
        handle: &mut ContainerHandle,
        to: LifecycleState,
        image: &str,
    ) -> Result<()> {
        let from = handle.state;
        handle.advance(to)?;
        debug!("Deploy [{}]: {} -> {}", handle.name, from, to);
        self.tracker.record(handle, image)
    }
}

/// Pause between run retries; bounded by the poll interval so test specs
/// with zeroed timings never sleep.
fn retry_pause(spec: &ServiceSpec) -> Duration {
    spec.health.interval().min(Duration::from_secs(1))
}

fn tolerate_not_found(outcome: Result<()>) -> Result<()> {
    match outcome {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}
