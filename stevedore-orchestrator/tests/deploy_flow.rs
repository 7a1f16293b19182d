//! End-to-end pipeline tests over the mock engine: the exact operation
//! sequence a deploy issues, and the deploy → stop → deploy cycle.

use async_trait::async_trait;
use std::time::Duration;

use stevedore_core::{
    BuildSpec, HealthProbeResult, HealthSpec, LifecycleState, RestartPolicy, ServiceSpec,
};
use stevedore_orchestrator::health::Prober;
use stevedore_orchestrator::lifecycle::Orchestrator;
use stevedore_orchestrator::runtime::MockEngine;
use stevedore_orchestrator::state::StateTracker;

struct AlwaysHealthy;

#[async_trait]
impl Prober for AlwaysHealthy {
    async fn probe(&self, _url: &str, _timeout: Duration) -> HealthProbeResult {
        HealthProbeResult::ok(Duration::from_millis(1))
    }
}

fn spec() -> ServiceSpec {
    ServiceSpec {
        name: "web".to_string(),
        image: "myapp".to_string(),
        tag: "v1.0.0".to_string(),
        ports: vec!["3000:3000".parse().unwrap()],
        env_file: None,
        volumes: vec![],
        restart_policy: RestartPolicy::UnlessStopped,
        registry: Some("registry.example.com/team".to_string()),
        push: true,
        build: Some(BuildSpec {
            context: ".".into(),
            dockerfile: None,
            build_args: vec![],
        }),
        health: HealthSpec {
            endpoint: "/health".to_string(),
            port: None,
            grace_secs: 0,
            interval_secs: 0,
            timeout_secs: 0,
            failure_budget: 3,
            run_retries: 3,
        },
    }
}

fn orchestrator(
    engine: MockEngine,
    dir: &tempfile::TempDir,
) -> Orchestrator<MockEngine, AlwaysHealthy> {
    let _ = env_logger::builder().is_test(true).try_init();
    let tracker = StateTracker::open(dir.path().join("state.json")).unwrap();
    Orchestrator::new(engine, AlwaysHealthy, tracker)
}

#[tokio::test]
async fn deploy_issues_the_documented_operation_sequence() {
    let engine = MockEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator(engine.clone(), &dir);

    let handle = orch.deploy(&spec()).await.unwrap();
    assert_eq!(handle.state, LifecycleState::Healthy);

    // build -> tag -> push, then the pre-run leftover check, run, and the
    // liveness check ahead of the first probe.
    assert_eq!(
        engine.calls(),
        vec!["build", "tag", "push", "inspect", "run", "inspect"]
    );
}

#[tokio::test]
async fn deploy_stop_deploy_cycle() {
    let engine = MockEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator(engine.clone(), &dir);

    orch.deploy(&spec()).await.unwrap();
    assert_eq!(orch.status("web").await.unwrap(), LifecycleState::Healthy);

    orch.teardown("web").await.unwrap();
    let stopped = orch.status("web").await.unwrap();
    assert!(matches!(
        stopped,
        LifecycleState::Stopped | LifecycleState::Absent
    ));

    // Redeploy after teardown starts a fresh container.
    let handle = orch.deploy(&spec()).await.unwrap();
    assert_eq!(handle.state, LifecycleState::Healthy);
    assert_eq!(engine.count("run"), 2);
    assert_eq!(engine.count("stop"), 1);
}

#[tokio::test]
async fn deploy_twice_runs_exactly_one_container() {
    let engine = MockEngine::new();
    let dir = tempfile::tempdir().unwrap();
    let mut orch = orchestrator(engine.clone(), &dir);

    orch.deploy(&spec()).await.unwrap();
    orch.deploy(&spec()).await.unwrap();

    assert_eq!(engine.count("run"), 1);
    assert_eq!(engine.count("build"), 1);
}
