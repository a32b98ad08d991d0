//! End-to-end tests of the `pvstat` binary.
//!
//! Each test points the binary at its own temporary database and config and
//! clears the environment variables that would otherwise leak in.

mod common;

use assert_cmd::Command;
use common::fixtures::{current_json, mount_current};
use predicates::prelude::*;
use serde_json::Value;
use wiremock::MockServer;

use pvstat::TestDir;

fn pvstat(dir: &TestDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("pvstat").expect("binary builds");
    cmd.env("PVSTAT_DB", dir.file_path("telemetry.sqlite"))
        .env("PVSTAT_CONFIG", dir.file_path("config.toml"))
        .env("XDG_CONFIG_HOME", dir.path())
        .env("HOME", dir.path())
        .env_remove("PVSTAT_SOURCE_URL")
        .env_remove("PVSTAT_TIMEZONE")
        .env_remove("PVSTAT_CAPACITY_KW")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn help_lists_commands() {
    let dir = TestDir::new();
    pvstat(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("backfill"))
        .stdout(predicate::str::contains("query"));
}

#[test]
fn no_command_prints_quickstart() {
    let dir = TestDir::new();
    pvstat(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"));
}

#[test]
fn stats_json_on_fresh_database() {
    let dir = TestDir::new();
    let output = pvstat(&dir).args(["stats", "--json"]).output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["timezone"], "UTC");
    let tables = json["tables"].as_array().unwrap();
    assert!(!tables.is_empty());
    assert!(tables.iter().all(|t| t["rows"] == 0));
    assert!(json["watermarks"].as_array().unwrap().iter().all(|w| w["value"].is_null()));
}

#[test]
fn empty_day_query_is_valid_json() {
    let dir = TestDir::new();
    let output = pvstat(&dir)
        .args(["--json", "query", "--granularity", "day", "--count", "7"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["period"], "day");
    assert_eq!(json["zoom"], 7);
    assert_eq!(json["chartData"].as_array().unwrap().len(), 0);
    assert_eq!(json["stats"]["totalEnergy"], 0.0);
}

#[test]
fn collect_without_source_is_config_error() {
    let dir = TestDir::new();
    pvstat(&dir)
        .arg("collect")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("PVS-C001"));
}

#[test]
fn inverted_backfill_range_is_rejected() {
    let dir = TestDir::new();
    pvstat(&dir)
        .args(["--json", "backfill", "--start", "2024-06-05", "--end", "2024-06-01"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("PVS-I002"));
}

#[test]
fn human_stats_are_plain_without_a_terminal() {
    let dir = TestDir::new();
    pvstat(&dir)
        .args(["--no-color", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Watermark"))
        .stdout(predicate::str::contains("\x1b[").not());
}

#[test]
fn half_hour_timezone_is_rejected() {
    let dir = TestDir::new();
    pvstat(&dir)
        .args(["--timezone", "Asia/Kolkata", "stats"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("PVS-C003"))
        .stderr(predicate::str::contains("whole number of hours"));
}

#[tokio::test(flavor = "multi_thread")]
async fn collect_against_mock_source_stores_a_sample() {
    let server = MockServer::start().await;
    mount_current(&server, current_json(1.8, 6.4)).await;
    let dir = TestDir::new();

    let db = dir.file_path("telemetry.sqlite");
    let base = server.uri();
    let mut collect = pvstat(&dir);
    collect.args(["--json", "--source-url", &base, "collect"]);
    let output = tokio::task::spawn_blocking(move || collect.output().unwrap())
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let store = pvstat::storage::TelemetryStore::open(&db).unwrap();
    let latest = store.latest_sample().unwrap().unwrap();
    assert!((latest.power_w - 1800.0).abs() < 1e-9);
    assert!((latest.energy_today_wh - 6400.0).abs() < 1e-9);

    let mut current = pvstat(&dir);
    current.args(["--json", "current"]);
    let output = tokio::task::spawn_blocking(move || current.output().unwrap())
        .await
        .unwrap();
    let json = stdout_json(&output);
    assert!((json["power"].as_f64().unwrap() - 1800.0).abs() < 1e-9);
    assert!(json.get("error").is_none());
}
