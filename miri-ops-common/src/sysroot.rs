//! Per-target sysroot preparation.

use crate::config::env::MIRI_SYSROOT;
use crate::process::{CommandRunner, ProcessError, ToolCommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SysrootError {
    #[error("Sysroot setup failed: {0}")]
    SetupFailed(#[source] ProcessError),

    #[error("Sysroot setup for {} printed no path", .target.as_deref().unwrap_or("the host"))]
    EmptyOutput { target: Option<String> },
}

/// A prepared sysroot for one target (`None` is the host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysrootHandle {
    pub target: Option<String>,
    pub path: PathBuf,
}

impl SysrootHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the sysroot to a child through `MIRI_SYSROOT`.
    pub fn export(&self, cmd: ToolCommand) -> ToolCommand {
        cmd.env(MIRI_SYSROOT, self.path.to_string_lossy())
    }
}

/// How to build a sysroot: `cargo run` on the cargo wrapper, asking it to
/// run `miri setup --print-sysroot`.
#[derive(Debug, Clone)]
pub struct SetupCommand {
    /// `cargo +<toolchain>` with the invocation environment applied.
    pub cargo: ToolCommand,
    pub manifest: PathBuf,
    pub extra_flags: Vec<String>,
}

impl SetupCommand {
    pub fn for_target(&self, target: Option<&str>) -> ToolCommand {
        let cmd = self
            .cargo
            .clone()
            .arg("run")
            .args(self.extra_flags.iter().cloned())
            .arg("--manifest-path")
            .arg_path(&self.manifest)
            .args(["-q", "--", "miri", "setup", "--print-sysroot"]);
        match target {
            Some(target) => cmd.args(["--target", target]),
            None => cmd,
        }
    }
}

/// Sysroots built during this invocation, keyed by target.
#[derive(Debug, Default)]
pub struct SysrootCache {
    preset: Option<PathBuf>,
    built: BTreeMap<Option<String>, SysrootHandle>,
}

impl SysrootCache {
    /// `preset` is a caller-supplied sysroot (`MIRI_SYSROOT`), used for every target.
    pub fn new(preset: Option<PathBuf>) -> Self {
        Self {
            preset,
            built: BTreeMap::new(),
        }
    }

    /// Return the sysroot for `target`, building it on first use.
    pub fn ensure(
        &mut self,
        runner: &dyn CommandRunner,
        setup: &SetupCommand,
        target: Option<&str>,
    ) -> Result<SysrootHandle, SysrootError> {
        let key = target.map(str::to_string);

        if let Some(path) = &self.preset {
            debug!(sysroot = %path.display(), "using pre-supplied sysroot");
            return Ok(SysrootHandle {
                target: key,
                path: path.clone(),
            });
        }

        if let Some(handle) = self.built.get(&key) {
            return Ok(handle.clone());
        }

        info!(triple = target.unwrap_or("host"), "preparing sysroot");
        let out = runner
            .read(&setup.for_target(target))
            .map_err(SysrootError::SetupFailed)?;
        if out.is_empty() {
            return Err(SysrootError::EmptyOutput { target: key });
        }

        let handle = SysrootHandle {
            target: key.clone(),
            path: PathBuf::from(out),
        };
        self.built.insert(key, handle.clone());
        Ok(handle)
    }
}
