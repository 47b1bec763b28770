//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data directory
//! and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "remindd-cli", "--"])
        .args(args)
        .env("REMINDD_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_event_add_and_list() {
    let (stdout, _, code) = run_cli(&[
        "event",
        "add",
        "CLI smoke event",
        "--start",
        "2099-01-01 09:00",
    ]);
    assert_eq!(code, 0, "event add failed");
    assert!(stdout.contains("Event created:"));

    let (stdout, _, code) = run_cli(&["event", "list"]);
    assert_eq!(code, 0, "event list failed");
    assert!(stdout.contains("CLI smoke event"));
}

#[test]
fn test_event_list_json() {
    let (stdout, _, code) = run_cli(&["event", "list", "--json"]);
    assert_eq!(code, 0, "event list --json failed");
    assert!(serde_json::from_str::<serde_json::Value>(&stdout).is_ok());
}

#[test]
fn test_reminder_list() {
    let (_, _, code) = run_cli(&["reminder", "list"]);
    assert_eq!(code, 0, "reminder list failed");
}

#[test]
fn test_reminder_add_requires_channel() {
    let (_, stderr, code) = run_cli(&[
        "event",
        "add",
        "Channel-less reminder target",
        "--start",
        "2099-01-01 09:00",
    ]);
    assert_eq!(code, 0, "{stderr}");

    // No --email/--webhook/--calendar: must be rejected.
    let (_, stderr, code) = run_cli(&["reminder", "add", "1", "--at", "2098-12-31 09:00"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("at least one of"));
}

#[test]
fn test_config_path() {
    let (stdout, _, code) = run_cli(&["config", "path"]);
    assert_eq!(code, 0, "config path failed");
    assert!(stdout.contains("config.toml"));
}
