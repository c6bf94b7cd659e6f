use crate::common::fixtures::miri_ops;
use crate::common::{Checkout, TestRun, assert_contains, assert_path_exists};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_missing_explicit_root_is_probe_failure() {
    let _run = TestRun::start("test_missing_explicit_root_is_probe_failure");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let missing = dir.path().join("no-such-checkout");
    let output = miri_ops()
        .arg("--root")
        .arg(&missing)
        .arg("toolchain")
        .output()
        .expect("Failed to run miri-ops toolchain");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "No managed root found");
    assert_contains(&stderr, "hint:");
}

#[test]
fn test_root_from_environment_variable() {
    let _run = TestRun::start("test_root_from_environment_variable");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = miri_ops()
        .env("MIRI_OPS_ROOT", dir.path().join("gone"))
        .arg("build")
        .output()
        .expect("Failed to run miri-ops build");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_no_pin_above_working_directory() {
    let _run = TestRun::start("test_no_pin_above_working_directory");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = miri_ops()
        .current_dir(dir.path())
        .arg("check")
        .output()
        .expect("Failed to run miri-ops check");

    assert_eq!(output.status.code(), Some(2));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "rust-version");
}

#[test]
fn test_malformed_config_file_is_usage_error() {
    let _run = TestRun::start("test_malformed_config_file_is_usage_error");

    let checkout = Checkout::new();
    assert_path_exists(&checkout.pin);
    fs::write(checkout.path().join("miri-ops.toml"), "[toolchain\nname = 1\n")
        .expect("Failed to write miri-ops.toml");

    let output = checkout
        .command()
        .arg("toolchain")
        .output()
        .expect("Failed to run miri-ops toolchain");

    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "miri-ops.toml");
}
