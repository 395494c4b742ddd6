//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const CIRCULAR_WAIT: &str = r#"{
    "name": "cli circular wait",
    "resources": [{"id": "R1", "units": 1}, {"id": "R2", "units": 1}],
    "processes": [
        {"id": "P1", "max": {"R1": 1, "R2": 1}, "priority": 1},
        {"id": "P2", "max": {"R1": 1, "R2": 1}, "priority": 2}
    ],
    "events": [
        {"time": 0.0, "type": "allocate", "proc": "P1", "res": "R1", "units": 1},
        {"time": 1.0, "type": "allocate", "proc": "P2", "res": "R2", "units": 1},
        {"time": 2.0, "type": "request", "proc": "P1", "res": "R2", "units": 1},
        {"time": 3.0, "type": "request", "proc": "P2", "res": "R1", "units": 1}
    ]
}"#;

fn dlsim() -> Command {
    Command::cargo_bin("dlsim").expect("binary built")
}

#[test]
fn simple_scenario_runs_to_completion() {
    dlsim()
        .arg("--simple")
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary"))
        .stdout(predicate::str::contains("DEADLOCKED"));
}

#[test]
fn missing_scenario_exits_with_one() {
    dlsim()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--scenario"));
}

#[test]
fn unreadable_scenario_exits_with_one() {
    dlsim()
        .args(["--scenario", "does/not/exist.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load scenario"));
}

#[test]
fn scenario_file_runs_and_reports_deadlock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("circular.json");
    fs::write(&path, CIRCULAR_WAIT).unwrap();

    dlsim()
        .args(["--scenario", path.to_str().unwrap(), "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DEADLOCK DETECTED"))
        .stdout(predicate::str::contains("Deadlocks Detected: 1"));
}

#[test]
fn recovery_override_breaks_the_deadlock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("circular.json");
    fs::write(&path, CIRCULAR_WAIT).unwrap();

    dlsim()
        .args([
            "--scenario",
            path.to_str().unwrap(),
            "--recovery",
            "preempt_low_priority",
            "--verbose",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recovery: Preempted P1"))
        .stdout(predicate::str::contains("NO DEADLOCK"));
}

#[test]
fn prevention_override_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("circular.json");
    fs::write(&path, CIRCULAR_WAIT).unwrap();

    dlsim()
        .args([
            "--scenario",
            path.to_str().unwrap(),
            "--policy",
            "bankers",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Prevention Policy: bankers"));
}

#[test]
fn export_writes_snapshot_document() {
    let dir = tempfile::tempdir().unwrap();
    let scenario_path = dir.path().join("circular.json");
    let export_path = dir.path().join("out.json");
    fs::write(&scenario_path, CIRCULAR_WAIT).unwrap();

    dlsim()
        .args([
            "--scenario",
            scenario_path.to_str().unwrap(),
            "--export",
            export_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let exported = fs::read_to_string(&export_path).unwrap();
    let document: serde_json::Value = serde_json::from_str(&exported).unwrap();
    assert_eq!(document["scenario"]["name"], "cli circular wait");
    assert_eq!(document["summary"]["total_events"], 4);
    assert_eq!(document["snapshots"].as_array().unwrap().len(), 5);
}

#[test]
fn yaml_scenario_loads() {
    let yaml = r#"
name: yaml ring
resources:
  - id: R1
    units: 2
processes:
  - id: P1
    max:
      R1: 2
events:
  - time: 0.0
    type: allocate
    proc: P1
    res: R1
    units: 1
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ring.yaml");
    fs::write(&path, yaml).unwrap();

    dlsim()
        .args(["--scenario", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("yaml ring"))
        .stdout(predicate::str::contains("NO DEADLOCK"));
}
