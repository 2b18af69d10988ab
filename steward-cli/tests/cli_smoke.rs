//! End-to-end CLI behaviour against an isolated home directory.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn steward(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("steward").expect("steward binary");
    cmd.env("HOME", home);
    cmd
}

fn write_manifest(home: &Path, name: &str, yaml: &str) {
    let dir = home.join(".steward/registry/manifest");
    fs::create_dir_all(&dir).expect("create registry dir");
    fs::write(dir.join(format!("{name}.manifest")), yaml).expect("write manifest");
}

#[test]
fn init_creates_home_layout_and_config() {
    let home = TempDir::new().expect("home");

    steward(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote configuration"));

    assert!(home.path().join(".steward/config.yaml").exists());
    assert!(home.path().join(".steward/registry").is_dir());
    assert!(home.path().join(".steward/state").is_dir());
    assert!(home.path().join(".steward/deploy").is_dir());
}

#[test]
fn init_twice_keeps_existing_config() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();
    steward(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration already exists"));
}

#[test]
fn run_reconciles_and_deploys() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();
    write_manifest(home.path(), "gateway", "name: gateway\nspec:\n  port: 8080\n");

    steward(home.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 created"));

    let deployed = home.path().join(".steward/deploy/manifest/gateway.json");
    assert!(deployed.exists(), "deployment file must exist after run");

    // Second run is a no-op.
    steward(home.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 unchanged"));
}

#[test]
fn run_json_emits_a_full_report() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();
    write_manifest(home.path(), "gateway", "name: gateway\n");

    let output = steward(home.path())
        .args(["run", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).expect("report JSON");
    assert_eq!(report["created"], 1);
    assert_eq!(report["transitions"][0]["outcome"], "created");
}

#[test]
fn run_surfaces_failures_without_failing_the_command() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();
    write_manifest(home.path(), "broken", "name: [unclosed\n");

    steward(home.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 failed"));
}

#[test]
fn status_reports_tracked_artefacts() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();

    steward(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No artefacts tracked"));

    write_manifest(home.path(), "gateway", "name: gateway\n");
    steward(home.path()).arg("run").assert().success();

    steward(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("gateway").and(predicate::str::contains("CREATED")));
}

#[test]
fn status_json_carries_summary_counts() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();
    write_manifest(home.path(), "gateway", "name: gateway\n");
    steward(home.path()).arg("run").assert().success();

    let output = steward(home.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let payload: serde_json::Value = serde_json::from_slice(&output).expect("status JSON");
    assert_eq!(payload["summary"]["artefacts"], 1);
    assert_eq!(payload["summary"]["failed"], 0);
    assert_eq!(payload["artefacts"][0]["lifecycle"], "created");
}

#[test]
fn daemon_status_without_daemon_reports_not_running() {
    let home = TempDir::new().expect("home");
    steward(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
}

#[test]
fn dependency_chain_applies_in_one_run() {
    let home = TempDir::new().expect("home");
    steward(home.path()).arg("init").assert().success();
    write_manifest(home.path(), "backend", "name: backend\n");
    write_manifest(
        home.path(),
        "gateway",
        "name: gateway\ndepends_on:\n  - backend\n",
    );

    steward(home.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 created"));

    assert!(home
        .path()
        .join(".steward/deploy/manifest/backend.json")
        .exists());
    assert!(home
        .path()
        .join(".steward/deploy/manifest/gateway.json")
        .exists());
}
