#![cfg(unix)]

use std::process::Stdio;
use std::time::Duration;

use supctl_core::{OutputRouter, ProcId};
use supctl_logging::{LogConfig, LogMultiplexer};
use tokio::process::Command;

fn multiplexer(dir: &tempfile::TempDir) -> LogMultiplexer {
    LogMultiplexer::new(LogConfig {
        base_dir: dir.path().to_path_buf(),
        flush_interval: Duration::from_millis(10),
        ..LogConfig::default()
    })
}

async fn run_attached(mux: &LogMultiplexer, id: &ProcId, script: &str) {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(script)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    mux.attach(id, child.stdout.take(), child.stderr.take())
        .await
        .unwrap();
    child.wait().await.unwrap();

    // Drain tasks race the wait; give them a beat, then force the flush.
    tokio::time::sleep(Duration::from_millis(100)).await;
    mux.manager().flush_all().await.unwrap();
}

#[tokio::test]
async fn both_streams_are_tagged_and_multiplexed() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);
    let id = ProcId::new("server").unwrap();

    run_attached(&mux, &id, "echo out line; echo err line 1>&2").await;

    let lines = mux.manager().read_logs(&id, 100).await.unwrap();
    assert_eq!(lines.len(), 2);

    let out = lines.iter().find(|l| l.ends_with("out line")).unwrap();
    assert!(out.starts_with("[server] ["), "bad prefix: {out}");
    assert!(out.contains("[stdout]"), "missing stream tag: {out}");

    let err = lines.iter().find(|l| l.ends_with("err line")).unwrap();
    assert!(err.contains("[stderr]"), "missing stream tag: {err}");
}

#[tokio::test]
async fn structured_read_splits_streams() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);
    let id = ProcId::new("worker").unwrap();

    run_attached(&mux, &id, "echo ok; echo bad 1>&2; echo ok2").await;

    let logs = mux.manager().read_structured_logs(&id, 100).await.unwrap();
    assert_eq!(logs.output.len(), 2);
    assert_eq!(logs.errors.len(), 1);
    assert!(logs.errors[0].ends_with("bad"));
}

#[tokio::test]
async fn output_appends_across_restarts_of_the_same_process() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);
    let id = ProcId::new("server").unwrap();

    run_attached(&mux, &id, "echo first run").await;
    run_attached(&mux, &id, "echo second run").await;

    let lines = mux.manager().read_logs(&id, 100).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("first run"));
    assert!(lines[1].ends_with("second run"));
}

#[tokio::test]
async fn detach_releases_writer_but_keeps_file() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);
    let id = ProcId::new("retired").unwrap();

    run_attached(&mux, &id, "echo farewell").await;
    mux.detach(&id).await;

    let path = mux.manager().log_path(&id);
    assert!(path.exists(), "log file must survive detach");
    let lines = mux.manager().read_logs(&id, 10).await.unwrap();
    assert!(lines[0].ends_with("farewell"));
}

#[tokio::test]
async fn tail_returns_only_requested_lines() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);
    let id = ProcId::new("chatty").unwrap();

    run_attached(&mux, &id, "for i in 1 2 3 4 5; do echo line $i; done").await;

    let lines = mux.manager().read_logs(&id, 2).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("line 4"));
    assert!(lines[1].ends_with("line 5"));
}

#[tokio::test]
async fn read_all_logs_lists_every_process_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);

    run_attached(&mux, &ProcId::new("zeta").unwrap(), "echo z").await;
    run_attached(&mux, &ProcId::new("alpha").unwrap(), "echo a").await;

    let all = mux.manager().read_all_logs(10).await.unwrap();
    let names: Vec<_> = all.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["alpha", "zeta"]);
}

#[tokio::test]
async fn missing_log_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mux = multiplexer(&dir);
    let id = ProcId::new("ghost").unwrap();

    let lines = mux.manager().read_logs(&id, 10).await.unwrap();
    assert!(lines.is_empty());
}
