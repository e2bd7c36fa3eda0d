//! Smoke tests -- verify the binary runs and key subcommands work.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("packetsentry").unwrap();
    cmd.env_remove("PACKETSENTRY_CONFIG").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Simulated network traffic classifier"));
}

#[test]
fn test_cli_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("packetsentry"));
}

#[test]
fn test_serve_subcommand_exists() {
    cli().args(["serve", "--help"]).assert().success();
}

#[test]
fn test_heartbeat_subcommand_exists() {
    cli().args(["heartbeat", "--help"]).assert().success();
}

#[test]
fn test_modes_lists_every_mode() {
    cli()
        .arg("modes")
        .assert()
        .success()
        .stdout(predicate::str::contains("ddos_volumetric"))
        .stdout(predicate::str::contains("dns_amplification"))
        .stdout(predicate::str::contains("CRITICAL"));
}

#[test]
fn test_classify_json() {
    let output = cli()
        .args(["classify", "--mode", "ddos", "--ticks", "5", "--seed", "1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["label"], "ddos_volumetric");
    assert_eq!(record["attack_detected"], true);
    assert_eq!(record["packet_count"], 50);
}

#[test]
fn test_classify_human_readable() {
    cli()
        .args(["classify", "--mode", "port_scan", "--ticks", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verdict:     port_scan"));
}

#[test]
fn test_classify_unknown_mode_fails() {
    cli()
        .args(["classify", "--mode", "teleport"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown attack mode"));
}

#[test]
fn test_history_on_fresh_database() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("history.db");
    cli()
        .args(["history", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("No analyses recorded."));
}

#[test]
fn test_explicit_missing_config_fails() {
    cli()
        .args(["--config", "/nonexistent/packetsentry.toml", "modes"])
        .assert()
        .failure();
}
