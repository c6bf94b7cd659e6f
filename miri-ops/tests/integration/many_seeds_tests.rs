use crate::common::fixtures::miri_ops;
use crate::common::{TestRun, assert_contains, assert_not_contains};
use tempfile::TempDir;

#[test]
fn test_stops_at_first_failing_seed() {
    let _run = TestRun::start("test_stops_at_first_failing_seed");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = miri_ops()
        .current_dir(dir.path())
        .args(["many-seeds", "sh", "-c", r#"test "$MIRIFLAGS" != "-Zmiri-seed=a""#])
        .output()
        .expect("Failed to run miri-ops many-seeds");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "Trying seed: 0");
    assert_contains(&stdout, "Trying seed: 9");
    assert_not_contains(&stdout, "Failing seed");
    assert_not_contains(&stdout, "Trying seed: b");
    assert_contains(&String::from_utf8_lossy(&output.stderr), "error: Failing seed: a");
}

#[test]
fn test_seed_count_from_environment() {
    let _run = TestRun::start("test_seed_count_from_environment");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = miri_ops()
        .current_dir(dir.path())
        .env("MIRI_SEEDS", "4")
        .args(["many-seeds", "true"])
        .output()
        .expect("Failed to run miri-ops many-seeds");

    assert!(output.status.success(), "sweep failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "Trying seed: 3");
    assert_not_contains(&stdout, "Trying seed: 4");
}

#[test]
fn test_caller_flags_and_sentinel_reach_the_command() {
    let _run = TestRun::start("test_caller_flags_and_sentinel_reach_the_command");

    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = miri_ops()
        .current_dir(dir.path())
        .env("MIRIFLAGS", "-Zmiri-disable-isolation")
        .env("MIRI_SEED_START", "16")
        .env("MIRI_SEEDS", "1")
        .args([
            "many-seeds",
            "sh",
            "-c",
            r#"test "$MIRIFLAGS" = "-Zmiri-disable-isolation -Zmiri-seed=10" && test "$MIRI_AUTO_OPS" = 42"#,
        ])
        .output()
        .expect("Failed to run miri-ops many-seeds");

    assert!(output.status.success(), "sweep failed: {output:?}");
}

#[test]
fn test_invalid_seed_count_is_rejected() {
    let _run = TestRun::start("test_invalid_seed_count_is_rejected");

    let output = miri_ops()
        .env("MIRI_SEEDS", "lots")
        .args(["many-seeds", "true"])
        .output()
        .expect("Failed to run miri-ops many-seeds");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "MIRI_SEEDS");
    assert_not_contains(&String::from_utf8_lossy(&output.stdout), "Trying seed");
}
