use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn vigil(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vigil").unwrap();
    cmd.current_dir(dir.path()).env("VIGIL_ROOT", dir.path());
    cmd
}

fn init_root(dir: &TempDir) {
    vigil(dir).arg("init").assert().success();
}

// ---------------------------------------------------------------------------
// vigil init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_the_vigil_tree() {
    let dir = TempDir::new().unwrap();
    vigil(&dir).arg("init").assert().success();

    assert!(dir.path().join(".vigil").is_dir());
    assert!(dir.path().join(".vigil/config.yaml").exists());
    assert!(dir.path().join(".vigil/approvals").is_dir());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    vigil(&dir).arg("init").assert().success();
    vigil(&dir).arg("init").assert().success();
}

// ---------------------------------------------------------------------------
// vigil action
// ---------------------------------------------------------------------------

#[test]
fn action_add_then_list_then_cancel() {
    let dir = TempDir::new().unwrap();
    init_root(&dir);

    let output = vigil(&dir)
        .args(["--json", "action", "add", "sync", "inbox", "mail"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let action: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let id = action["id"].as_str().unwrap().to_owned();

    vigil(&dir)
        .args(["action", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inbox"));

    vigil(&dir)
        .args(["action", "cancel", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("cancelled"));

    // A second cancel fails: the action is already in history.
    vigil(&dir).args(["action", "cancel", &id]).assert().failure();
}

#[test]
fn action_add_rejects_bad_recurrence() {
    let dir = TempDir::new().unwrap();
    init_root(&dir);
    vigil(&dir)
        .args(["action", "add", "sync", "inbox", "mail", "--every", "fortnightly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown recurrence"));
}

// ---------------------------------------------------------------------------
// vigil goal
// ---------------------------------------------------------------------------

#[test]
fn goal_lifecycle_through_the_cli() {
    let dir = TempDir::new().unwrap();
    init_root(&dir);

    let output = vigil(&dir)
        .args(["--json", "goal", "add", "Research the market", "--category", "research"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let goal: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let id = goal["id"].as_str().unwrap().to_owned();

    vigil(&dir)
        .args(["goal", "criterion", &id, "report written"])
        .assert()
        .success();
    vigil(&dir)
        .args(["goal", "done", &id, "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("goal is complete"));

    vigil(&dir)
        .args(["goal", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Research the market"));
}

// ---------------------------------------------------------------------------
// vigil status / approvals
// ---------------------------------------------------------------------------

#[test]
fn status_reports_empty_state_as_json() {
    let dir = TempDir::new().unwrap();
    init_root(&dir);

    let output = vigil(&dir)
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let status: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(status["queue"], 0);
    assert_eq!(status["active_goals"], 0);
    assert!(status["lease"].is_null());
}

#[test]
fn approve_without_request_fails() {
    let dir = TempDir::new().unwrap();
    init_root(&dir);
    vigil(&dir)
        .args(["approve", "nonexistent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no approval request"));
}
