//! Integration tests for the flotilla CLI surface.
//!
//! Every test points `FLOTILLA_HOME` at a private temp directory so no
//! test touches the operator's real fleet state or the network.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn flotilla(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flotilla").expect("flotilla binary should exist");
    cmd.env("FLOTILLA_HOME", home.path());
    cmd
}

fn add_edge1(home: &TempDir) {
    flotilla(home)
        .args(["add", "edge-1", "10.0.0.5", "--user", "ops"])
        .assert()
        .success();
}

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fleet"));
}

#[test]
fn test_cli_help_flag_lists_commands() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("bootstrap"))
        .stdout(predicate::str::contains("ping"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["version", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"version":"0.3.0"}"#));
}

// --- Add ---

#[test]
fn test_add_then_list_shows_node() {
    let home = TempDir::new().expect("tempdir");
    add_edge1(&home);
    flotilla(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("edge-1"))
        .stdout(predicate::str::contains("ops@10.0.0.5:22"));
}

#[test]
fn test_add_json_returns_node_record() {
    let home = TempDir::new().expect("tempdir");
    let output = flotilla(&home)
        .args(["add", "edge-1", "10.0.0.5", "--user", "ops", "--port", "2222", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let node: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout must be JSON");
    assert_eq!(node["name"], "edge-1");
    assert_eq!(node["port"], 2222);
    assert_eq!(node["trusted"], false);
    assert!(node["id"].as_str().expect("id").starts_with("node-"));
}

#[test]
fn test_add_rejects_case_variant_duplicate() {
    let home = TempDir::new().expect("tempdir");
    add_edge1(&home);
    flotilla(&home)
        .args(["add", "EDGE-1", "10.0.0.6", "--user", "ops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    // Exactly one record survives.
    let output = flotilla(&home)
        .args(["list", "--json"])
        .output()
        .expect("run");
    let nodes: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(nodes.as_array().expect("array").len(), 1);
}

#[test]
fn test_add_rejects_invalid_name_and_flag_prefix_host() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["add", "bad name!", "10.0.0.5", "--user", "ops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid node name"));
    flotilla(&home)
        .args(["add", "edge-1", "--user", "ops", "--", "-oProxyCommand=evil"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid host"));
}

#[test]
fn test_add_rejects_out_of_range_port() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["add", "edge-1", "10.0.0.5", "--user", "ops", "--port", "70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid port"));
}

// --- Show ---

#[test]
fn test_show_is_case_insensitive() {
    let home = TempDir::new().expect("tempdir");
    add_edge1(&home);
    flotilla(&home)
        .args(["show", "EDGE-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ops@10.0.0.5:22"));
}

#[test]
fn test_show_unknown_node_fails() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_show_json_failure_emits_structured_error() {
    let home = TempDir::new().expect("tempdir");
    let output = flotilla(&home)
        .args(["show", "ghost", "--json"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let err: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json error object");
    assert_eq!(err["error"], true);
    assert!(
        err["message"].as_str().expect("message").contains("not found"),
        "message: {}",
        err["message"]
    );
}

// --- Remove ---

#[test]
fn test_remove_force_deletes_node() {
    let home = TempDir::new().expect("tempdir");
    add_edge1(&home);
    flotilla(&home)
        .args(["remove", "edge-1", "--force"])
        .assert()
        .success();
    flotilla(&home)
        .args(["show", "edge-1"])
        .assert()
        .failure();
}

#[test]
fn test_remove_unknown_node_fails() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["remove", "ghost", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// --- Status / offline paths (no network reachable from tests) ---

#[test]
fn test_status_with_empty_inventory_is_quiet_success() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home).args(["status", "--json"]).assert().success().stdout("[]\n");
}

#[test]
fn test_status_unknown_node_fails() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["status", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// --- Bootstrap argument surface ---

#[test]
fn test_bootstrap_unknown_node_fails_before_any_connection() {
    let home = TempDir::new().expect("tempdir");
    flotilla(&home)
        .args(["bootstrap", "ghost", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// --- Fleet directory hygiene ---

#[cfg(unix)]
#[test]
fn test_inventory_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let home = TempDir::new().expect("tempdir");
    add_edge1(&home);
    let meta = std::fs::metadata(home.path().join("inventory.json")).expect("inventory exists");
    assert_eq!(meta.permissions().mode() & 0o777, 0o600);
}
