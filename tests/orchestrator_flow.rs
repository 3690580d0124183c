//! Pipeline flows over the demo tree with a scripted executor.

use std::sync::Arc;
use std::time::Duration;

use shipcheck::config::{self, Config};
use shipcheck::exec::{ExecResult, ScriptedExecutor};
use shipcheck::pipeline::{Orchestrator, PipelineEvent, SessionState, Stage, run_full_stack};
use shipcheck::{Error, scaffold};

const HELLO: &str = "{\"message\":\"Hello from Backend!\"}";

fn setup_src() -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    scaffold::init(dir.path()).expect("failed to scaffold demo tree");
    let mut cfg = config::load(dir.path()).expect("failed to load config");
    cfg.state_dir = dir.path().join(".shipcheck").display().to_string();
    (dir, cfg)
}

/// Healthy answers, after any rules already on `exec`.
fn healthy(exec: ScriptedExecutor) -> ScriptedExecutor {
    exec.on(
        &["kubectl apply"],
        ExecResult::ok(
            "deployment.apps/backend-app created\nservice/backend-service created\n\
             deployment.apps/frontend-app created\nservice/frontend-service created\n",
        ),
    )
    .on(
        &["kubectl get pods -o wide"],
        ExecResult::ok("NAME READY STATUS\nbackend-app-1 1/1 Running\nfrontend-app-1 1/1 Running\n"),
    )
    .on(&["kubectl run test-backend"], ExecResult::ok(HELLO))
    .on(
        &["kubectl run test-frontend"],
        ExecResult::ok("<!DOCTYPE html>\n<html><body>Frontend</body></html>"),
    )
    .on(&["kubectl run e2e-test"], ExecResult::ok(HELLO))
}

fn collect(rx: std::sync::mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    rx.into_iter().collect()
}

#[test]
fn background_run_completes_with_report() {
    let (dir, cfg) = setup_src();
    let exec = Arc::new(healthy(ScriptedExecutor::new()));

    let events = collect(run_full_stack(cfg, dir.path().to_path_buf(), exec.clone()));

    let report = match events.last() {
        Some(PipelineEvent::Completed(report)) => report,
        other => panic!("expected Completed, got: {other:?}"),
    };
    assert!(report.all_passed());
    assert!(report.cross_matches_data());
    assert!(report.render().contains("frontend-app-1"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["data_service"]["status"], "pass");
    assert_eq!(json["images"].as_array().map(Vec::len), Some(2));

    let finished: Vec<(Stage, bool)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageFinished { stage, success } => Some((*stage, *success)),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), Stage::PIPELINE.len());
    assert!(finished.iter().all(|(_, ok)| *ok));

    // Manifests are applied from the mount, not the host path.
    assert_eq!(exec.count("kubectl apply -f /manifests"), 1);
    assert_eq!(exec.count("manifests:/manifests:ro"), 1);
}

#[test]
fn apply_failure_aborts_with_run_id() {
    let (dir, cfg) = setup_src();
    let exec = Arc::new(healthy(ScriptedExecutor::new().on(
        &["kubectl apply"],
        ExecResult::failed(1, "error: error validating \"/manifests/backend.yaml\""),
    )));

    let events = collect(run_full_stack(cfg, dir.path().to_path_buf(), exec.clone()));

    match events.last() {
        Some(PipelineEvent::Aborted(reason)) => {
            assert!(reason.contains("manifest apply failed"));
            assert!(reason.contains("shipcheck down"));
        }
        other => panic!("expected Aborted, got: {other:?}"),
    }
    assert_eq!(exec.count("rollout status"), 0);
    assert_eq!(exec.count("kubectl run"), 0);
}

#[test]
fn cluster_that_never_becomes_ready_is_a_provision_error() {
    let (dir, mut cfg) = setup_src();
    cfg.timeouts.start = 1;
    let exec = healthy(
        ScriptedExecutor::new().on(&["--raw=/readyz"], ExecResult::failed(1, "connection refused")),
    );
    let mut orchestrator =
        Orchestrator::new(cfg, &exec).with_poll_interval(Duration::from_millis(50));

    let err = orchestrator.provision_and_deploy(dir.path()).unwrap_err();

    assert!(matches!(err, Error::Provision(ref msg) if msg.contains("not ready")));
    assert!(matches!(orchestrator.session(), SessionState::Unprovisioned));
    assert_eq!(orchestrator.stage(), Stage::Failed);
    assert_eq!(exec.count("kubectl apply"), 0);
}

#[test]
fn commands_pass_through_to_the_cluster() {
    let (dir, cfg) = setup_src();
    let exec = healthy(
        ScriptedExecutor::new().on(&["kubectl get nodes"], ExecResult::ok("node-1 Ready\n")),
    );
    let mut orchestrator =
        Orchestrator::new(cfg, &exec).with_poll_interval(Duration::from_millis(1));

    let server = orchestrator.provision_and_deploy(dir.path()).unwrap();
    assert!(server.container.ends_with("-server"));
    let statuses = orchestrator.wait_ready().unwrap();
    assert_eq!(statuses.len(), 2);

    let out = orchestrator
        .run_command(&["kubectl".into(), "get".into(), "nodes".into()])
        .unwrap();
    assert_eq!(out, "node-1 Ready\n");
    assert_eq!(orchestrator.stage(), Stage::WorkloadsReady);
}
