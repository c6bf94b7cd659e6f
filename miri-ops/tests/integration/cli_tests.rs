use crate::common::fixtures::miri_ops;
use crate::common::{TestRun, assert_contains};

#[test]
fn test_help_lists_commands() {
    let _run = TestRun::start("test_help_lists_commands");

    let output = miri_ops().arg("--help").output().expect("Failed to run miri-ops --help");

    assert!(output.status.success(), "miri-ops --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["toolchain", "many-seeds", "bench", "rustc-pull", "rustc-push", "bless"] {
        assert_contains(&stdout, command);
    }
}

#[test]
fn test_version_succeeds() {
    let _run = TestRun::start("test_version_succeeds");

    let output = miri_ops().arg("--version").output().expect("Failed to run miri-ops --version");

    assert!(output.status.success());
    assert_contains(&String::from_utf8_lossy(&output.stdout), env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_unknown_command_is_usage_error() {
    let _run = TestRun::start("test_unknown_command_is_usage_error");

    let output = miri_ops().arg("frobnicate").output().expect("Failed to run miri-ops");

    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "frobnicate");
}

#[test]
fn test_rustc_push_requires_branch() {
    let _run = TestRun::start("test_rustc_push_requires_branch");

    let output = miri_ops()
        .args(["rustc-push", "octocat"])
        .output()
        .expect("Failed to run miri-ops");

    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "<BRANCH>");
}
