//! Smoke tests for the `radiotun` binary.
//!
//! Attaching a real TUN/TAP device needs privileges, so these cover the
//! paths that must fail before any device or stage is touched.

use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_radiotun"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to spawn radiotun")
}

#[test]
fn help_lists_flags() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--address", "--tun", "--mesh", "--node-id", "--data-rate", "--config"] {
        assert!(stdout.contains(flag), "help should mention {flag}: {stdout}");
    }
}

#[test]
fn invalid_address_exits_with_diagnostic() {
    let output = run(&["-a", "08"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid node address"), "stderr: {stderr}");
}

#[test]
fn unsupported_data_rate_exits_with_diagnostic() {
    let output = run(&["-a", "01", "-d", "3"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported data rate: 3"), "stderr: {stderr}");
}

#[test]
fn unreadable_config_exits_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let output = run(&["--config", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read config file"), "stderr: {stderr}");
}

#[test]
fn invalid_config_value_exits_with_diagnostic() {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut config_file, b"[bridge]\nmode = \"tun\"\n").unwrap();

    let output = run(&["--config", config_file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mesh"), "stderr: {stderr}");
}
