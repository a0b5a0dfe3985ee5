//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home directory
//! so config and the SQLite store start empty.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_recertify"))
        .args(args)
        .env("HOME", home)
        .env_remove("RECERTIFY_ENV")
        .env("RECERTIFY_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Run a CLI command with `input` piped to stdin.
fn run_cli_with_stdin(home: &Path, args: &[&str], input: &str) -> (String, String, i32) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_recertify"))
        .args(args)
        .env("HOME", home)
        .env_remove("RECERTIFY_ENV")
        .env("RECERTIFY_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI command");

    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");
    let output = child.wait_with_output().expect("Failed to wait on CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn json_lines(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn login(home: &Path, extra: &[&str]) -> (String, String, i32) {
    let mut args = vec![
        "--store",
        "sqlite",
        "session",
        "login",
        "--user-id",
        "1001",
        "--user-name",
        "Dana Owner",
        "--auth-code",
        "code-123",
    ];
    args.extend_from_slice(extra);
    run_cli(home, &args)
}

#[test]
fn test_config_list_is_json() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0, "config list failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["session"]["duration_budget_secs"], 3600);
    assert_eq!(parsed["identity"]["signout_page"], "/signout");
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "session.warning_lead_secs", "120"]);
    assert_eq!(code, 0, "config set failed");
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "session.warning_lead_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "120");
}

#[test]
fn test_config_set_rejects_lead_beyond_budget() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["config", "set", "session.warning_lead_secs", "7200"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_config_get_unknown_key_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "session.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_status_requires_login() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not signed in"));
}

#[test]
fn test_login_then_status() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = login(home.path(), &[]);
    assert_eq!(code, 0, "login failed");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["user"]["id"], "1001");
    assert_eq!(parsed["user"]["name"], "Dana Owner");

    let (stdout, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 0, "status failed");
    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["type"], "StateSnapshot");
    assert_eq!(snapshot["state"], "running");
    assert_eq!(snapshot["prompt_visible"], false);
    assert!(snapshot["remaining_ms"].as_u64().unwrap() > 0);
    assert_eq!(snapshot["user"]["id"], "1001");
    assert_eq!(snapshot["user"]["is_admin"], false);
    assert!(snapshot.get("logout_destination").is_none());
}

#[test]
fn test_admin_flag_follows_config() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(
        home.path(),
        &["config", "set", "identity.admin_user_ids", r#"["1001"]"#],
    );
    assert_eq!(code, 0, "config set admin list failed");

    let (stdout, _, code) = login(home.path(), &[]);
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["user"]["is_admin"], true);

    let (stdout, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 0);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["user"]["is_admin"], true);
}

#[test]
fn test_status_of_spent_session_reports_logout() {
    let home = TempDir::new().unwrap();
    for (key, value) in [
        ("session.warning_lead_secs", "1"),
        ("session.duration_budget_secs", "2"),
    ] {
        let (_, _, code) = run_cli(home.path(), &["config", "set", key, value]);
        assert_eq!(code, 0, "config set {key} failed");
    }
    let (_, _, code) = login(home.path(), &["--logout-url", "https://idp.example.com/logout"]);
    assert_eq!(code, 0);

    std::thread::sleep(std::time::Duration::from_millis(2500));

    let (stdout, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 0, "status failed");
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["state"], "terminated");
    assert_eq!(status["logout_destination"], "https://idp.example.com/logout");

    let (_, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 1, "spent session should be signed out");
}

#[test]
fn test_watch_starts_and_quits() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = login(home.path(), &[]);
    assert_eq!(code, 0);

    let (stdout, _, code) =
        run_cli_with_stdin(home.path(), &["--store", "sqlite", "session", "watch"], "q\n");
    assert_eq!(code, 0, "watch failed");
    let events = json_lines(&stdout);
    let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["SessionStarted", "SessionStopped"]);
    assert_eq!(events[1]["cause"], "requested");

    // Quitting the watcher keeps the session signed in.
    let (_, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 0);
}

#[test]
fn test_watch_requires_login() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) =
        run_cli_with_stdin(home.path(), &["--store", "sqlite", "session", "watch"], "");
    assert_eq!(code, 1);
    assert!(stderr.contains("not signed in"));
}

#[test]
fn test_login_rejects_blank_auth_code() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &[
            "--store",
            "sqlite",
            "session",
            "login",
            "--user-id",
            "1001",
            "--user-name",
            "Dana Owner",
            "--auth-code",
            " ",
        ],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_logout_clears_session_and_is_logged() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "identity.open_browser", "false"]);
    assert_eq!(code, 0);
    let (_, _, code) = login(home.path(), &["--logout-url", "https://idp.example.com/logout"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "logout"]);
    assert_eq!(code, 0, "logout failed");
    let event: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(event["type"], "LoggedOut");
    assert_eq!(event["reason"], "forced");
    assert_eq!(event["destination"], "https://idp.example.com/logout");

    let (_, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "status"]);
    assert_eq!(code, 1, "status should fail after logout");

    let (stdout, _, code) = run_cli(home.path(), &["session", "history", "--limit", "5"]);
    assert_eq!(code, 0);
    let history: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(history[0]["event_type"], "LoggedOut");
}

#[test]
fn test_logout_without_login_uses_signout_page() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["--store", "sqlite", "session", "logout"]);
    assert_eq!(code, 0);
    let event: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(event["destination"], "/signout");
}
