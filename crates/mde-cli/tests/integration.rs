#![allow(deprecated)]
use assert_cmd::Command;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, api_url: &str, extra: &str) -> PathBuf {
    let path = dir.path().join("mde-response.yaml");
    let yaml = format!(
        "api:\n  url: {api_url}\n  auth_url: {api_url}/oauth2/token\n  client_id: app\n  \
         client_secret: s3cret\nstore:\n  path: {store}\ndownload:\n  dir: {downloads}\n{extra}",
        store = dir.path().join("state/processed.redb").display(),
        downloads = dir.path().join("downloads").display(),
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

fn mde(config: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("mde-response").unwrap();
    cmd.env("MDE_RESPONSE_CONFIG", config)
        .env_remove("MDE_CLIENT_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

fn mock_token(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/oauth2/token")
        .with_body(r#"{"access_token": "tok", "token_type": "Bearer", "expires_in": "3599"}"#)
        .create()
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_clean() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "https://api.example", "");
    mde(&config)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_zero_interval_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "https://api.example",
        "machine_action:\n  poll_interval_secs: 0\n",
    );
    mde(&config)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_validate_json_lists_warnings() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        "https://api.example",
        "machine_action:\n  isolation:\n    enabled: true\n    type_code: Partial\n",
    );
    mde(&config)
        .args(["--json", "config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"warnings\""))
        .stdout(predicate::str::contains("Partial"));
}

#[test]
fn config_show_masks_secret() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "https://api.example", "");
    mde(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("poll_interval_secs: 30"))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("s3cret").not());
}

#[test]
fn missing_config_is_reported() {
    let dir = TempDir::new().unwrap();
    mde(&dir.path().join("nope.yaml"))
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config not found"));
}

// ---------------------------------------------------------------------------
// remediate
// ---------------------------------------------------------------------------

#[test]
fn remediate_rejects_unknown_verdict() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "https://api.example", "");
    mde(&config)
        .args([
            "remediate", "--verdict", "evil", "--sha256", "abc", "--machine", "m1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid verdict"));
}

#[test]
fn remediate_with_nothing_enabled_makes_no_calls() {
    let mut server = Server::new();
    let token = server.mock("POST", "/oauth2/token").expect(0).create();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.url(), "");

    mde(&config)
        .args([
            "remediate", "--verdict", "malicious", "--sha256", "abc", "--machine", "m1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No containment actions enabled"));
    token.assert();
}

#[test]
fn remediate_comments_verdict_onto_alerts() {
    let mut server = Server::new();
    mock_token(&mut server);
    let patched = server
        .mock("PATCH", "/api/alerts/da1")
        .match_header("authorization", "Bearer tok")
        .match_body(Matcher::Regex("Verdict: MALICIOUS".into()))
        .with_body(r#"{"id": "da1"}"#)
        .create();
    server
        .mock("PATCH", "/api/alerts/da2")
        .with_status(404)
        .with_body(r#"{"error": {"code": "NotFound", "message": "Alert not found"}}"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.url(), "");

    mde(&config)
        .args([
            "remediate", "--verdict", "malicious", "--sha256", "abc", "--machine", "m1",
            "--alert", "da1", "--alert", "da2", "--sample-url", "https://sandbox.example/1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("updated"))
        .stdout(predicate::str::contains("Alert not found"))
        .stdout(predicate::str::contains("No containment actions enabled"));
    patched.assert();
}

// ---------------------------------------------------------------------------
// machine status
// ---------------------------------------------------------------------------

#[test]
fn machine_status_reports_busy_action() {
    let mut server = Server::new();
    mock_token(&mut server);
    server
        .mock("GET", "/api/machineactions")
        .match_query(Matcher::UrlEncoded("$filter".into(), "machineId eq 'm1'".into()))
        .match_header("authorization", "Bearer tok")
        .with_body(
            r#"{"value": [
                {"id": "a1", "type": "Isolate", "status": "Succeeded"},
                {"id": "a2", "type": "LiveResponse", "status": "InProgress"}
            ]}"#,
        )
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.url(), "");

    mde(&config)
        .args(["machine", "status", "m1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is busy: LiveResponse a2 is InProgress"))
        .stdout(predicate::str::contains("ACTION"));

    mde(&config)
        .args(["--json", "machine", "status", "m1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"available\": false"));
}

#[test]
fn machine_status_vendor_error_fails() {
    let mut server = Server::new();
    mock_token(&mut server);
    server
        .mock("GET", "/api/machineactions")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error": {"code": "NotFound", "message": "Machine not found"}}"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.url(), "");

    mde(&config)
        .args(["machine", "status", "m9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Machine not found"));
}

// ---------------------------------------------------------------------------
// acquire
// ---------------------------------------------------------------------------

#[test]
fn acquire_dry_run_lists_plan_without_recording() {
    let mut server = Server::new();
    mock_token(&mut server);
    server
        .mock("GET", "/api/alerts")
        .match_query(Matcher::UrlEncoded("$expand".into(), "evidence".into()))
        .with_body(
            r#"{"value": [{
                "id": "da1", "severity": "High", "machineId": "m1",
                "evidence": [{"entityType": "File", "sha1": "s1",
                              "sha256": "0123456789abcdef", "fileName": "evil.exe",
                              "filePath": "C:\\temp"}]
            }, {
                "id": "da2", "severity": "Low", "machineId": null,
                "evidence": [{"entityType": "File", "sha256": "fedcba9876543210"}]
            }]}"#,
        )
        .create();
    let submit = server
        .mock("POST", Matcher::Regex("^/api/machines/".into()))
        .expect(0)
        .create();
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.url(), "");

    mde(&config)
        .args(["acquire", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("m1"))
        .stdout(predicate::str::contains("0123456789ab"))
        .stdout(predicate::str::contains("C:\\temp\\evil.exe"))
        .stdout(predicate::str::contains("fedcba987654").not());

    submit.assert();
    assert!(!dir.path().join("state/processed.redb").exists());
}
