use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const PINNED_COMMIT: &str = "c8dfcfe046a7680554bf4eb612bad840e7631c4b";

/// A minimal managed checkout: a version pin and nothing else.
pub struct Checkout {
    pub dir: TempDir,
    pub pin: PathBuf,
}

impl Checkout {
    pub fn new() -> Self {
        tracing::debug!(target: "test", "creating managed checkout");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let pin = dir.path().join("rust-version");
        fs::write(&pin, format!("{PINNED_COMMIT}\n")).expect("Failed to write rust-version");

        Self { dir, pin }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The binary, run from inside this checkout with a scrubbed environment.
    pub fn command(&self) -> Command {
        let mut cmd = miri_ops();
        cmd.current_dir(self.path());
        cmd
    }
}

/// The binary with every variable it reads removed from the inherited environment.
pub fn miri_ops() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_miri-ops"));
    for var in [
        "MIRIFLAGS",
        "MIRI_SYSROOT",
        "MIRI_TEST_TARGET",
        "MIRI_AUTO_OPS",
        "MIRI_OPS_ROOT",
        "MIRI_OPS_LOG",
        "MIRI_OPS_LOG_FILE",
        "MIRI_SEED_START",
        "MIRI_SEEDS",
        "CARGO_EXTRA_FLAGS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}
