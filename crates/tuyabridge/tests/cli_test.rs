//! Integration tests for the `tuyabridge` CLI binary.
//!
//! Argument parsing, config errors and a device listing against a mocked
//! cloud API. Nothing here reaches the real Tuya cloud.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

const ISOLATED_HOME: &str = "/tmp/tuyabridge-cli-test-nonexistent";

/// Build a command for the `tuyabridge` binary with env isolation.
fn tuyabridge_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("tuyabridge");
    cmd.env("HOME", ISOLATED_HOME)
        .env("XDG_CONFIG_HOME", ISOLATED_HOME)
        .env_remove("RUST_LOG");
    for var in [
        "CONFIG_FILE",
        "ACCESS_ID",
        "ACCESS_KEY",
        "USERNAME",
        "PASSWORD",
        "COUNTRY_CODE",
        "APP_SCHEMA",
        "PROJECT_TYPE",
        "ENDPOINT",
        "LANG",
        "TIMEOUT",
        "PROTOCOL_VERSION",
        "CA_CERT",
    ] {
        cmd.env_remove(format!("TUYABRIDGE_{var}"));
    }
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = tuyabridge_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    tuyabridge_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("send")),
    );
}

#[test]
fn test_unknown_output_format_rejected() {
    tuyabridge_cmd()
        .args(["-o", "yaml", "devices"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_uses_platform_dir() {
    tuyabridge_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(ISOLATED_HOME).and(predicate::str::contains("config.toml")),
        );
}

#[test]
fn test_config_path_prefers_explicit_file() {
    tuyabridge_cmd()
        .args(["--config", "/tmp/elsewhere.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/elsewhere.toml"));
}

#[test]
fn test_missing_credentials_is_usage_error() {
    let output = tuyabridge_cmd().arg("devices").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("access_id"), "{text}");
    assert!(text.contains("TUYABRIDGE_ACCESS_ID"), "{text}");
}

#[test]
fn test_explicit_config_must_exist() {
    let output = tuyabridge_cmd()
        .args(["--config", "/tmp/tuyabridge-no-such-file.toml", "devices"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("not found"));
}

#[test]
fn test_smart_home_requires_country_code() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    std::fs::write(
        &file,
        r#"
access_id = "id"
access_key = "key"
username = "alice"
password = "secret"
project_type = "smart_home"
app_schema = "smartlife"
"#,
    )
    .unwrap();

    let output = tuyabridge_cmd()
        .arg("--config")
        .arg(&file)
        .arg("devices")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("country_code"));
}

// ── Against a mocked cloud ──────────────────────────────────────────

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "result": result }))
}

async fn mount_directory(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1.0/iot-03/users/login"))
        .respond_with(ok(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "uid": "u1",
            "expire": 7_200_000
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/users/assets"))
        .respond_with(ok(json!({ "assets": [{ "asset_id": "home" }] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-02/assets/home/devices"))
        .respond_with(ok(json!({ "list": [{ "device_id": "d1" }] })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/devices"))
        .respond_with(ok(json!({ "list": [
            { "id": "d1", "name": "Lamp", "category": "dj", "online": true }
        ]})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/devices/status"))
        .respond_with(ok(json!([
            { "id": "d1", "status": [{ "code": "switch_led", "value": true }] }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/iot-03/devices/d1/functions"))
        .respond_with(ok(json!({ "category": "dj", "functions": [] })))
        .mount(server)
        .await;
}

fn cloud_cmd(server: &MockServer) -> assert_cmd::Command {
    let mut cmd = tuyabridge_cmd();
    cmd.env("TUYABRIDGE_ACCESS_ID", "id")
        .env("TUYABRIDGE_ACCESS_KEY", "key")
        .env("TUYABRIDGE_USERNAME", "alice")
        .env("TUYABRIDGE_PASSWORD", "secret")
        .env("TUYABRIDGE_ENDPOINT", server.uri());
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_json_against_mock_cloud() {
    let server = MockServer::start().await;
    mount_directory(&server).await;

    let mut cmd = cloud_cmd(&server);
    cmd.args(["devices", "-o", "json-compact"]);
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let devices: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(devices[0]["id"], "d1");
    assert_eq!(devices[0]["kind"], "Light");
    assert_eq!(devices[0]["status"]["switch_led"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_device_exits_not_found() {
    let server = MockServer::start().await;
    mount_directory(&server).await;

    let mut cmd = cloud_cmd(&server);
    cmd.args(["devices", "nope"]);
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("nope"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_login_exits_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/iot-03/users/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": false, "code": 2406, "msg": "bad password" })),
        )
        .mount(&server)
        .await;

    let mut cmd = cloud_cmd(&server);
    cmd.arg("devices");
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}
