//! Integration tests driving the compiled binary.
//!
//! Firewall-touching paths require root and a firewall tool and are marked
//! with #[ignore]. Run them with: `sudo cargo test -- --ignored`

use std::path::PathBuf;
use std::process::Command;

/// Helper to get the path to the compiled binary
fn get_binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps directory
    path.push("deadlock-server-picker");
    path
}

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn run_picker(args: &[&str]) -> std::process::Output {
    let binary = get_binary_path();
    Command::new(&binary)
        .args(args)
        .output()
        .expect("Failed to execute deadlock-server-picker")
}

#[test]
fn test_version_command() {
    let output = run_picker(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("deadlock-server-picker"));
}

#[test]
fn test_help_command() {
    let output = run_picker(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("block"));
    assert!(stdout.contains("unblock"));
    assert!(stdout.contains("reset"));
    assert!(stdout.contains("--dry-run"));
}

#[test]
fn test_unknown_command_fails() {
    let output = run_picker(&["frobnicate"]);
    assert!(!output.status.success());
}

#[test]
fn test_block_requires_servers() {
    let output = run_picker(&["block"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required") || stderr.contains("Usage"));
}

#[test]
fn test_regions_command_works_offline() {
    let output = run_picker(&["regions"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("North America"));
    assert!(stdout.contains("allow-region"));
}

#[test]
fn test_config_path_honors_config_dir() {
    let dir = std::env::temp_dir().join("dsp-test-config-path");
    let output = run_picker(&["--config-dir", dir.to_str().unwrap(), "config", "path"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dsp-test-config-path"));
    assert!(stdout.contains("config.json"));
}

#[test]
fn test_config_set_and_show_roundtrip() {
    let dir = std::env::temp_dir().join(format!("dsp-test-config-{}", std::process::id()));
    let dir_str = dir.to_str().unwrap();

    let output = run_picker(&["--config-dir", dir_str, "config", "set", "clustered", "true"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = run_picker(&["--config-dir", dir_str, "config", "show"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("clustered:          true"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let dir = std::env::temp_dir().join("dsp-test-config-bad");
    let output = run_picker(&[
        "--config-dir",
        dir.to_str().unwrap(),
        "config",
        "set",
        "nonsense",
        "1",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown config key"));
}

#[test]
fn test_config_set_rejects_unknown_region() {
    let dir = std::env::temp_dir().join("dsp-test-config-region");
    let output = run_picker(&[
        "--config-dir",
        dir.to_str().unwrap(),
        "config",
        "set",
        "default_region",
        "atlantis",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_preset_list_empty() {
    let dir = std::env::temp_dir().join("dsp-test-presets-empty");
    let output = run_picker(&["--config-dir", dir.to_str().unwrap(), "preset", "list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No presets found"));
}

#[test]
#[ignore] // Requires root and a firewall tool
fn test_status_command() {
    if !is_root() {
        eprintln!("Skipping test_status_command: requires root");
        return;
    }

    let output = run_picker(&["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stdout.contains("Status") || stderr.contains("no usable firewall backend"),
        "Unexpected output: stdout={}, stderr={}",
        stdout,
        stderr
    );
}

#[test]
#[ignore] // Requires root, a firewall tool, and network access
fn test_dry_run_block_is_distinguishable() {
    if !is_root() {
        eprintln!("Skipping test_dry_run_block_is_distinguishable: requires root");
        return;
    }

    let output = run_picker(&["block", "sgp", "--dry-run", "--no-sudo"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        assert!(stdout.contains("[dry-run]"));
        assert!(stdout.contains("would add"));
    }
}

#[test]
#[ignore] // Requires root and a firewall tool
fn test_reset_then_status_shows_empty() {
    if !is_root() {
        eprintln!("Skipping test_reset_then_status_shows_empty: requires root");
        return;
    }

    let reset = run_picker(&["reset", "--no-sudo"]);
    if !reset.status.success() {
        return; // no backend available in this environment
    }
    let status = run_picker(&["status", "--no-sudo"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("Active rules: 0"));
}
