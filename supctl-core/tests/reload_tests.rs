#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use supctl_core::{
    DiscardRouter, NativeRunner, ProcSnapshot, ProcState, ProcessSpec, Registry, Supervisor,
    SupervisorOptions,
};

fn sleeper(name: &str, enabled: bool) -> ProcessSpec {
    let mut spec = ProcessSpec::new(name, "/bin/sh");
    spec.args = vec!["-c".to_string(), "sleep 30".to_string()];
    spec.enabled = enabled;
    spec.stop_timeout = Duration::from_secs(2);
    spec
}

fn supervisor(specs: Vec<ProcessSpec>) -> Arc<Supervisor> {
    let registry = Registry::from_specs(specs).unwrap();
    Arc::new(
        Supervisor::new(
            &registry,
            Arc::new(NativeRunner::new()),
            Arc::new(DiscardRouter),
            SupervisorOptions::default(),
        )
        .unwrap(),
    )
}

async fn wait_for(
    supervisor: &Supervisor,
    name: &str,
    pred: impl Fn(&ProcSnapshot) -> bool,
    timeout: Duration,
) -> ProcSnapshot {
    let deadline = Instant::now() + timeout;
    loop {
        let snap = supervisor.status(Some(name)).unwrap().remove(0);
        if pred(&snap) {
            return snap;
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for {name}; last state {:?}", snap.state);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn enabling_a_parked_entry_starts_only_that_process() {
    let sup = supervisor(vec![sleeper("server", true), sleeper("schedule", false)]);
    sup.start_all().await;
    let server = wait_for(&sup, "server", |s| s.state.is_running(), Duration::from_secs(5)).await;

    let new = Registry::from_specs(vec![sleeper("server", true), sleeper("schedule", true)]).unwrap();
    let summary = sup.reload(&new).await.unwrap();
    assert_eq!(summary.started, 1);
    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 0);

    wait_for(&sup, "schedule", |s| s.state.is_running(), Duration::from_secs(5)).await;
    let after = sup.status(Some("server")).unwrap().remove(0);
    assert_eq!(after.pid, server.pid, "untouched process was restarted");
    assert!(after.state.is_running());

    sup.stop_all(Some(Duration::from_secs(2))).await;
}

#[tokio::test]
async fn disabling_a_running_entry_stops_but_retains_it() {
    let sup = supervisor(vec![sleeper("server", true), sleeper("worker", true)]);
    sup.start_all().await;
    wait_for(&sup, "worker", |s| s.state.is_running(), Duration::from_secs(5)).await;

    let new = Registry::from_specs(vec![sleeper("server", true), sleeper("worker", false)]).unwrap();
    let summary = sup.reload(&new).await.unwrap();
    assert_eq!(summary.stopped, 1);

    let snapshots = sup.status(None).unwrap();
    assert_eq!(snapshots.len(), 2, "disabled entry must stay listed");
    let worker = snapshots.iter().find(|s| s.name == "worker").unwrap();
    assert_eq!(worker.state, ProcState::Stopped);
    assert!(!worker.enabled);

    sup.stop_all(Some(Duration::from_secs(2))).await;
}

#[tokio::test]
async fn removed_entry_is_stopped_and_retired() {
    let sup = supervisor(vec![sleeper("server", true), sleeper("worker", true)]);
    sup.start_all().await;
    wait_for(&sup, "worker", |s| s.state.is_running(), Duration::from_secs(5)).await;

    let new = Registry::from_specs(vec![sleeper("server", true)]).unwrap();
    let summary = sup.reload(&new).await.unwrap();
    assert_eq!(summary.removed, 1);

    let snapshots = sup.status(None).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].name, "server");
    assert!(sup.status(Some("worker")).is_err());

    sup.stop_all(Some(Duration::from_secs(2))).await;
}

#[tokio::test]
async fn added_entry_is_started() {
    let sup = supervisor(vec![sleeper("server", true)]);
    sup.start_all().await;
    wait_for(&sup, "server", |s| s.state.is_running(), Duration::from_secs(5)).await;

    let new = Registry::from_specs(vec![sleeper("server", true), sleeper("worker", true)]).unwrap();
    let summary = sup.reload(&new).await.unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.started, 1);
    wait_for(&sup, "worker", |s| s.state.is_running(), Duration::from_secs(5)).await;

    sup.stop_all(Some(Duration::from_secs(2))).await;
}

#[tokio::test]
async fn spec_edit_is_stored_without_restarting() {
    let sup = supervisor(vec![sleeper("server", true)]);
    sup.start_all().await;
    let before = wait_for(&sup, "server", |s| s.state.is_running(), Duration::from_secs(5)).await;

    let mut edited = sleeper("server", true);
    edited.max_restarts = Some(5);
    let new = Registry::from_specs(vec![edited]).unwrap();
    let summary = sup.reload(&new).await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.started, 0);
    assert_eq!(summary.stopped, 0);

    let after = sup.status(Some("server")).unwrap().remove(0);
    assert_eq!(after.pid, before.pid, "spec edit must not bounce the process");

    sup.stop_all(Some(Duration::from_secs(2))).await;
}

#[tokio::test]
async fn reload_with_identical_registry_is_a_no_op() {
    let specs = vec![sleeper("server", true), sleeper("schedule", false)];
    let sup = supervisor(specs.clone());
    sup.start_all().await;
    wait_for(&sup, "server", |s| s.state.is_running(), Duration::from_secs(5)).await;

    let summary = sup.reload(&Registry::from_specs(specs).unwrap()).await.unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 0);
    assert_eq!(summary.started, 0);
    assert_eq!(summary.stopped, 0);
    assert_eq!(summary.updated, 0);

    sup.stop_all(Some(Duration::from_secs(2))).await;
}
