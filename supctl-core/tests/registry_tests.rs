use supctl_core::{Error, ProcessSpec, Registry, RestartPolicy};

#[test]
fn list_preserves_declaration_order() {
    let registry = Registry::from_specs(vec![
        ProcessSpec::new("server", "./target/release/server"),
        ProcessSpec::new("pallet-stream", "./target/release/pallet-stream"),
        ProcessSpec::new("cw721-stream", "./target/release/cw721-stream"),
    ])
    .unwrap();

    let names: Vec<_> = registry.list().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["server", "pallet-stream", "cw721-stream"]);
}

#[test]
fn duplicate_name_is_a_validation_error() {
    let err = Registry::from_specs(vec![
        ProcessSpec::new("server", "./a"),
        ProcessSpec::new("server", "./b"),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
}

#[test]
fn empty_name_and_empty_command_are_rejected() {
    assert!(matches!(
        Registry::from_specs(vec![ProcessSpec::new("", "./a")]),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        Registry::from_specs(vec![ProcessSpec::new("a", "  ")]),
        Err(Error::Validation(_))
    ));
}

#[test]
fn disabled_entries_are_retained() {
    let mut parked = ProcessSpec::new("schedule", "./target/release/schedule");
    parked.enabled = false;

    let registry =
        Registry::from_specs(vec![ProcessSpec::new("server", "./server"), parked]).unwrap();
    assert_eq!(registry.len(), 2);
    assert!(!registry.find("schedule").unwrap().enabled);
}

#[test]
fn find_unknown_name_is_not_found() {
    let registry = Registry::from_specs(vec![ProcessSpec::new("server", "./server")]).unwrap();
    assert!(matches!(registry.find("ghost"), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn load_ecosystem_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecosystem.config.json");
    tokio::fs::write(
        &path,
        r#"{
          "apps": [
            { "name": "server", "script": "./target/release/server" },
            { "name": "pallet-stream", "script": "./target/release/pallet-stream" },
            { "name": "cw721-stream", "script": "./target/release/cw721-stream" },
            { "name": "schedule", "script": "./target/release/schedule", "enabled": false }
          ]
        }"#,
    )
    .await
    .unwrap();

    let registry = Registry::load(&path).await.unwrap();
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.list()[0].name, "server");
    assert_eq!(registry.list()[0].restart_policy, RestartPolicy::OnFailure);
    assert!(!registry.find("schedule").unwrap().enabled);
}

#[tokio::test]
async fn load_with_duplicate_names_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecosystem.config.json");
    tokio::fs::write(
        &path,
        r#"{ "apps": [ { "name": "x", "script": "./x" }, { "name": "x", "script": "./y" } ] }"#,
    )
    .await
    .unwrap();

    assert!(matches!(
        Registry::load(&path).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn js_config_is_rejected_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecosystem.config.js");
    tokio::fs::write(&path, "module.exports = { apps: [] };")
        .await
        .unwrap();

    match Registry::load(&path).await {
        Err(Error::Config(msg)) => assert!(msg.contains("JSON"), "unhelpful message: {msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_registry_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Registry::load(dir.path().join("nope.json")).await;
    assert!(matches!(result, Err(Error::Config(_))));
}
