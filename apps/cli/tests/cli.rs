//! Integration tests for the `percolate` binary

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn percolate() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_percolate"));
    cmd.env_remove("PERCOLATE_LOG")
        .env_remove("PERCOLATE_CONFIG")
        .env_remove("RUST_LOG")
        .env("PERCOLATE_LOG_FORMAT", "compact");
    cmd
}

#[test]
fn interval_with_defaults() {
    // 5000 x1.2 without active orders
    percolate()
        .args(["interval", "--base-ms", "5000"])
        .assert()
        .success()
        .stdout("next poll in 6000 ms\n");
}

#[test]
fn interval_backs_off_on_errors() {
    percolate()
        .args(["interval", "--base-ms", "5000", "--errors", "2", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""delay_ms":20000"#));
}

#[test]
fn interval_stops_offline() {
    percolate()
        .args(["interval", "--quality", "offline"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("stop"));
}

#[test]
fn config_file_sets_engine_floor() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[engine]\nmin_interval_ms = 9000").unwrap();

    percolate()
        .args(["interval", "--base-ms", "5000", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout("next poll in 9000 ms\n");
}

#[test]
fn environment_overrides_engine_settings() {
    percolate()
        .env("PERCOLATE_ENGINE__MIN_INTERVAL_MS", "7000")
        .args(["interval", "--base-ms", "5000"])
        .assert()
        .success()
        .stdout("next poll in 7000 ms\n");
}

#[test]
fn watch_without_targets_fails() {
    percolate()
        .arg("watch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to watch"));
}

#[test]
fn malformed_target_is_rejected() {
    percolate()
        .args(["watch", "cashier-orders"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=URL"));
}

#[test]
fn invalid_config_is_reported() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[engine]\ndegraded_skip_probability = 2.0").unwrap();

    percolate()
        .args(["interval", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("degraded_skip_probability"));
}
