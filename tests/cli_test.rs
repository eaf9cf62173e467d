//! Command-line tests for the `listen-stats` binary

mod common;

use assert_cmd::Command;
use common::{sample_history, write_history};
use listen_stats::ListeningEvent;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Binary isolated from any config file or override in the developer's environment
fn listen_stats(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("listen-stats").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("LISTEN_STATS_ENDPOINT")
        .env_remove("LISTEN_STATS_BATCH_SIZE")
        .env_remove("LISTEN_STATS_POLICY")
        .env_remove("LISTEN_STATS_TIMEOUT_SECS")
        .env_remove("LOG_LEVEL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_analyze_json_report() {
    let dir = TempDir::new().unwrap();
    let path = write_history(
        dir.path(),
        "history.json",
        &[
            ListeningEvent::new("Song A", "Artist X", "2023-01-01T10:00:00Z", 100_000),
            ListeningEvent::new("Song B", "Artist Y", "2023-01-02T10:00:00Z", 200_000)
                .with_skipped(true)
                .with_platform("ios"),
            ListeningEvent::new("Song A", "Artist X", "2023-02-01T10:00:00Z", 60_000),
        ],
    );

    let output = listen_stats(&dir)
        .args(["analyze", "--json", "--batch-size", "1", "--concurrency", "2"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["totalPlays"], 3);
    assert_eq!(report["totalMsPlayed"], 360_000);
    assert_eq!(report["repeatTracks"], 1);
    assert_eq!(report["uniqueTracks"], 2);
    assert_eq!(report["topTracks"][0]["name"], "Song A");
    assert_eq!(report["topTracks"][0]["plays"], 2);
    assert_eq!(report["skipsPlatform"]["ios"], 1.0);
    assert_eq!(report["monthlyDiscoveries"]["2023-01"], 2);
    assert_eq!(report["monthlyDiscoveries"]["2023-02"], 0);
}

#[test]
fn test_analyze_directory_with_date_window() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("export");
    fs::create_dir(&data).unwrap();
    write_history(&data, "a.json", &sample_history(300));
    write_history(
        &data,
        "b.json",
        &[ListeningEvent::new("Late", "Artist", "2024-06-01T00:00:00Z", 1_000)],
    );

    listen_stats(&dir)
        .args(["analyze", "--json", "--until", "2023-12-31"])
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Late\"").not());
}

#[test]
fn test_analyze_terminal_report() {
    let dir = TempDir::new().unwrap();
    let path = write_history(dir.path(), "history.json", &sample_history(500));

    listen_stats(&dir)
        .args(["analyze", "--quiet", "--top", "3"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Listening History Report"))
        .stdout(predicate::str::contains("Top tracks"));
}

#[test]
fn test_config_file_is_logged_once_logging_is_up() {
    let dir = TempDir::new().unwrap();
    let path = write_history(dir.path(), "history.json", &sample_history(20));
    fs::write(
        dir.path().join("listen-stats.toml"),
        r#"
[logging]
level = "INFO"
format = "pretty"
output = "console"

[processing]
batch_size = 5
max_concurrency = 2
policy = "sliding"
request_timeout_secs = 0
top_n = 10
"#,
    )
    .unwrap();

    listen_stats(&dir)
        .args(["analyze", "--json"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded configuration from file"))
        .stderr(predicate::str::contains("Request timeout disabled"));
}

#[test]
fn test_missing_file_reports_error() {
    let dir = TempDir::new().unwrap();

    listen_stats(&dir)
        .args(["analyze", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));

    listen_stats(&dir)
        .args(["analyze", "--json", "nope.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\""));
}

#[test]
fn test_history_without_valid_events_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, r#"[{"master_metadata_track_name": "A"}]"#).unwrap();

    listen_stats(&dir)
        .args(["analyze", "--quiet"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no valid listening events"));
}

#[test]
fn test_invalid_arguments_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_history(dir.path(), "history.json", &sample_history(10));

    listen_stats(&dir)
        .args(["analyze", "--policy", "random"])
        .arg(&path)
        .assert()
        .failure();

    listen_stats(&dir)
        .args(["analyze", "--since", "2023/01/01"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));

    listen_stats(&dir)
        .args(["analyze", "--concurrency", "0"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max concurrency"));
}

#[test]
fn test_bench_json_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_history(dir.path(), "history.json", &sample_history(400));

    let output = listen_stats(&dir)
        .args([
            "bench",
            "--json",
            "--batch-sizes",
            "100,200",
            "--concurrency-levels",
            "1,2",
        ])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["batchSize"], 100);
    assert_eq!(rows[0]["batches"], 4);
    assert_eq!(rows[3]["maxConcurrency"], 2);
    assert!(rows.iter().all(|r| r["records"] == 400));
}
