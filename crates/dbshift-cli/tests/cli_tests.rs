//! CLI integration tests for dbshift.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions. Everything that touches a
//! database uses SQLite files in a temporary directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the dbshift binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("dbshift").unwrap();
    cmd.env_remove("DBSHIFT_PASSWORD");
    cmd
}

fn config_arg(dir: &TempDir) -> String {
    dir.path().join("database.yaml").to_string_lossy().into_owned()
}

fn install_sqlite(dir: &TempDir) {
    let db = dir.path().join("data/app.db");
    cmd()
        .args(["--config", &config_arg(dir), "--verbosity", "error", "install"])
        .args(["--type", "sqlite", "--database"])
        .arg(&db)
        .assert()
        .success();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("optimize"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_migrate_subcommand_help() {
    cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--type"))
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--database"))
        .stdout(predicate::str::contains("--ssl-mode"))
        .stdout(predicate::str::contains("DBSHIFT_PASSWORD"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbshift"));
}

#[test]
fn test_global_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("--verbosity"));
}

// =============================================================================
// Error Exit Code Tests
// =============================================================================

#[test]
fn test_missing_subcommand_fails() {
    cmd().assert().failure();
}

#[test]
fn test_status_without_config_is_config_error() {
    let dir = TempDir::new().unwrap();
    cmd()
        .args(["--config", &config_arg(&dir), "status"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("run the installer first"));
}

#[test]
fn test_unknown_engine_type() {
    let dir = TempDir::new().unwrap();
    cmd()
        .args(["--config", &config_arg(&dir), "install"])
        .args(["--type", "oracle", "--database", "app"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown database type"));
}

#[test]
fn test_server_engine_requires_host() {
    let dir = TempDir::new().unwrap();
    cmd()
        .args(["--config", &config_arg(&dir), "install"])
        .args(["--type", "mysql", "--database", "app", "--username", "root"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("host is required"));
    assert!(!Path::new(&config_arg(&dir)).exists());
}

// =============================================================================
// SQLite Workflow Tests
// =============================================================================

#[test]
fn test_install_then_status() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);
    assert!(Path::new(&config_arg(&dir)).exists());

    cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Engine: sqlite"))
        .stdout(predicate::str::contains("users"))
        .stdout(predicate::str::contains("audit_log"));
}

#[test]
fn test_status_json_output() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    let output = cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "--output-json", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["engine"], "sqlite");
    assert_eq!(status["tables"].as_array().unwrap().len(), 8);
}

#[test]
fn test_second_install_refused() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    cmd()
        .args(["--config", &config_arg(&dir), "install"])
        .args(["--type", "sqlite", "--database", "other.db"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already installed"));
}

#[test]
fn test_health_check_and_optimize() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "health-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "optimize"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Optimize sqlite: OK"));
}

#[test]
fn test_migrate_to_sqlite_rejected() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    cmd()
        .args(["--config", &config_arg(&dir), "migrate"])
        .args(["--type", "sqlite", "--database", "copy.db"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("server engine"));
}

#[test]
fn test_migrate_unreachable_server_keeps_config() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);
    let before = std::fs::read_to_string(config_arg(&dir)).unwrap();

    cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "migrate"])
        .args(["--type", "mysql", "--host", "127.0.0.1", "--port", "1"])
        .args(["--database", "app", "--username", "root", "--password", "x"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Migration failed while probing target"));

    let after = std::fs::read_to_string(config_arg(&dir)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_migrate_failure_reported_once() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    let output = cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "migrate"])
        .args(["--type", "mysql", "--host", "127.0.0.1", "--port", "1"])
        .args(["--database", "app", "--username", "root", "--password", "x"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Migration failed").count(), 1, "{}", stderr);
    assert!(!stderr.contains("Error: Connection"), "{}", stderr);
}

#[test]
fn test_migrate_failure_json_output() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    let output = cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "--output-json", "migrate"])
        .args(["--type", "postgres", "--host", "127.0.0.1", "--port", "1"])
        .args(["--database", "app", "--username", "postgres", "--password", "x"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["success"], false);
    assert!(response.get("redirect").is_none());
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("Migration failed while probing target"));
}

#[test]
fn test_second_install_json_output() {
    let dir = TempDir::new().unwrap();
    install_sqlite(&dir);

    let output = cmd()
        .args(["--config", &config_arg(&dir), "--verbosity", "error", "--output-json", "install"])
        .args(["--type", "sqlite", "--database", "other.db"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("already installed"));
}
