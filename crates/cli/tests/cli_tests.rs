//! CLI integration tests

use std::process::Command;

fn sactl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sactl"))
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sactl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Stream Analytics"), "Should show app name");
    for command in ["submit", "count", "health", "load"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sactl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sactl"), "Should show binary name");
}

/// Test submit subcommand help
#[test]
fn test_submit_help() {
    let output = sactl()
        .args(["submit", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Submit help should succeed");
    assert!(stdout.contains("--cpu"), "Should show cpu option");
    assert!(stdout.contains("--rps"), "Should show rps option");
    assert!(stdout.contains("--timestamp"), "Should show timestamp option");
}

/// Test load subcommand help
#[test]
fn test_load_help() {
    let output = sactl()
        .args(["load", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Load help should succeed");
    assert!(stdout.contains("--rate"), "Should show rate option");
    assert!(stdout.contains("--anomaly-ratio"), "Should show anomaly ratio option");
}

/// Submit without required arguments should fail
#[test]
fn test_submit_requires_values() {
    let output = sactl()
        .arg("submit")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Submit without values should fail");
}

/// Invalid output format should fail
#[test]
fn test_invalid_format() {
    let output = sactl()
        .args(["--format", "yaml", "count"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid format should fail");
}

/// Unreachable service is reported as an error exit
#[test]
fn test_unreachable_service_fails() {
    let output = sactl()
        .args(["--api-url", "http://127.0.0.1:9", "count"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Count against a closed port should fail");
}
