//! Automatic maintenance before main-pipeline commands.
//!
//! Marker files at the managed root opt into toolchain sync, formatting and
//! linting before every command. The gate fires at most once per top-level
//! invocation: nested invocations inherit the `MIRI_AUTO_OPS` sentinel and
//! skip it entirely.

use crate::context::OpsContext;
use crate::error::OpsError;
use std::path::Path;
use tracing::{debug, info};

pub const MARKER_EVERYTHING: &str = ".auto-everything";
pub const MARKER_TOOLCHAIN: &str = ".auto-toolchain";
pub const MARKER_FMT: &str = ".auto-fmt";
pub const MARKER_CLIPPY: &str = ".auto-clippy";

/// Which automatic steps are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMarkers {
    pub toolchain: bool,
    pub fmt: bool,
    pub clippy: bool,
}

impl SyncMarkers {
    pub fn all() -> Self {
        Self {
            toolchain: true,
            fmt: true,
            clippy: true,
        }
    }

    /// Read the marker files present at `root`.
    pub fn detect(root: &Path) -> Self {
        if root.join(MARKER_EVERYTHING).exists() {
            return Self::all();
        }
        Self {
            toolchain: root.join(MARKER_TOOLCHAIN).exists(),
            fmt: root.join(MARKER_FMT).exists(),
            clippy: root.join(MARKER_CLIPPY).exists(),
        }
    }

    pub fn any(&self) -> bool {
        self.toolchain || self.fmt || self.clippy
    }
}

/// The work behind each automatic step.
pub trait AutoSteps {
    fn sync_toolchain(&mut self) -> Result<(), OpsError>;
    fn format(&mut self) -> Result<(), OpsError>;
    fn lint(&mut self, flags: &[String]) -> Result<(), OpsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStep {
    Toolchain,
    Fmt,
    Clippy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoOpsReport {
    pub executed: Vec<AutoStep>,
    /// Why nothing ran, when the gate was closed.
    pub skipped: Option<SkipReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An enclosing invocation already runs auto ops.
    Inherited,
    /// The gate already fired in this process.
    AlreadyFired,
}

/// Run-once guard around the automatic steps.
#[derive(Debug)]
pub struct AutoOpsGate {
    inherited: bool,
    fired: bool,
}

impl AutoOpsGate {
    pub fn new(ctx: &OpsContext) -> Self {
        Self {
            inherited: ctx.auto_ops_running(),
            fired: false,
        }
    }

    /// Run the steps enabled by `markers`, in order: toolchain, fmt, clippy.
    pub fn run_once(
        &mut self,
        markers: SyncMarkers,
        steps: &mut dyn AutoSteps,
    ) -> Result<AutoOpsReport, OpsError> {
        if self.inherited {
            debug!("auto ops already running in a parent invocation");
            return Ok(AutoOpsReport {
                executed: Vec::new(),
                skipped: Some(SkipReason::Inherited),
            });
        }
        if self.fired {
            return Ok(AutoOpsReport {
                executed: Vec::new(),
                skipped: Some(SkipReason::AlreadyFired),
            });
        }
        self.fired = true;

        let mut report = AutoOpsReport::default();
        if !markers.any() {
            debug!("no auto-ops markers present");
            return Ok(report);
        }
        if markers.toolchain {
            info!("auto: syncing toolchain");
            steps.sync_toolchain()?;
            report.executed.push(AutoStep::Toolchain);
        }
        if markers.fmt {
            info!("auto: formatting");
            steps.format()?;
            report.executed.push(AutoStep::Fmt);
        }
        if markers.clippy {
            info!("auto: linting");
            steps.lint(&["-D".to_string(), "warnings".to_string()])?;
            report.executed.push(AutoStep::Clippy);
        }
        Ok(report)
    }
}
