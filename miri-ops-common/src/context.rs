//! Immutable execution context threaded through every component.

use crate::config::env::MIRI_AUTO_OPS;
use crate::config::{AUTO_OPS_SENTINEL, EnvSettings, OpsConfig};
use crate::pin::PIN_FILE_NAME;
use crate::probe::ProbeError;
use crate::process::ToolCommand;
use std::path::{Path, PathBuf};

/// Everything a component needs to know about the current invocation.
#[derive(Debug, Clone)]
pub struct OpsContext {
    root: PathBuf,
    pub env: EnvSettings,
    pub config: OpsConfig,
}

impl OpsContext {
    pub fn new(root: impl Into<PathBuf>, env: EnvSettings, config: OpsConfig) -> Self {
        Self {
            root: root.into(),
            env,
            config,
        }
    }

    /// Root of the managed subtree (where the version pin lives).
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pin_path(&self) -> PathBuf {
        self.root.join(PIN_FILE_NAME)
    }

    /// Manifest of the driver crate.
    pub fn driver_manifest(&self) -> PathBuf {
        self.root.join("Cargo.toml")
    }

    /// Manifest of the cargo wrapper crate.
    pub fn cargo_miri_manifest(&self) -> PathBuf {
        self.root.join("cargo-miri").join("Cargo.toml")
    }

    pub fn bench_dir(&self) -> PathBuf {
        self.root.join(&self.config.bench.dir)
    }

    /// Build-artifact directory, `CARGO_TARGET_DIR` or `<root>/target`.
    pub fn target_dir(&self) -> PathBuf {
        self.env
            .target_dir
            .clone()
            .unwrap_or_else(|| self.root.join("target"))
    }

    /// Whether auto ops already ran higher up in the process tree.
    pub fn auto_ops_running(&self) -> bool {
        self.env.auto_ops_running
    }

    /// Context for a nested invocation of the orchestrator.
    ///
    /// Mirrors what a child process would see: the recursion sentinel is set,
    /// and an exported sysroot is inherited.
    pub fn nested(&self, sysroot: Option<&Path>) -> Self {
        let mut env = self.env.clone();
        env.auto_ops_running = true;
        if let Some(sysroot) = sysroot {
            env.sysroot = Some(sysroot.to_path_buf());
        }
        Self {
            root: self.root.clone(),
            env,
            config: self.config.clone(),
        }
    }

    /// A command rooted at the managed directory that carries the recursion sentinel.
    pub fn command(&self, program: &str) -> ToolCommand {
        ToolCommand::new(program)
            .current_dir(&self.root)
            .env(MIRI_AUTO_OPS, AUTO_OPS_SENTINEL)
    }
}

/// Find the managed root.
///
/// An explicit directory (flag or `MIRI_OPS_ROOT`) wins; otherwise the nearest
/// ancestor of `start` that holds a version pin.
pub fn discover_root(explicit: Option<&Path>, start: &Path) -> Result<PathBuf, ProbeError> {
    if let Some(dir) = explicit {
        return if dir.is_dir() {
            Ok(dir.to_path_buf())
        } else {
            Err(ProbeError::RootNotFound {
                searched: dir.to_path_buf(),
            })
        };
    }

    start
        .ancestors()
        .find(|dir| dir.join(PIN_FILE_NAME).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| ProbeError::RootNotFound {
            searched: start.to_path_buf(),
        })
}
