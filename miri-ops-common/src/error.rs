//! Top-level error type and exit-code mapping.
//!
//! Each component has its own `thiserror` enum; they all convert into
//! [`OpsError`], which decides the process exit code and the remediation
//! hints printed by the binary.

use crate::bench::BenchError;
use crate::config::{ConfigFileError, EnvError};
use crate::pin::PinError;
use crate::probe::ProbeError;
use crate::process::ProcessError;
use crate::seeds::SweepError;
use crate::sync::SyncError;
use crate::sysroot::SysrootError;
use crate::toolchain::ToolchainError;
use thiserror::Error;

/// Exit code for usage errors, sync races and collisions.
pub const EXIT_USAGE: i32 = 1;
/// Exit code for environment-probe failures.
pub const EXIT_PROBE: i32 = 2;

/// How an error is reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown command or bad arguments.
    Usage,
    /// The local environment is not in a usable state.
    EnvironmentProbe,
    /// An external tool failed; carries its exit code, `None` if signalled.
    ExternalTool(Option<i32>),
    /// Upstream moved while pulling.
    SyncRace,
    /// The push target branch already exists.
    SyncCollision,
    /// The history bridge or local repository is in an unexpected state.
    Sync,
    /// Everything else.
    Internal,
}

impl ErrorCategory {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Usage | Self::SyncRace | Self::SyncCollision | Self::Sync => EXIT_USAGE,
            Self::EnvironmentProbe => EXIT_PROBE,
            Self::ExternalTool(Some(code)) if *code != 0 => *code,
            Self::ExternalTool(_) => EXIT_USAGE,
            Self::Internal => EXIT_USAGE,
        }
    }
}

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Sysroot(#[from] SysrootError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Bench(#[from] BenchError),

    #[error(transparent)]
    ConfigFile(#[from] ConfigFileError),

    #[error("Invalid environment:\n{}", format_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error(transparent)]
    Pin(#[from] PinError),

    #[error("Failing seed: {seed:x}")]
    SeedFailed { seed: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<Vec<EnvError>> for OpsError {
    fn from(errors: Vec<EnvError>) -> Self {
        Self::Env(errors)
    }
}

impl OpsError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Usage(_) | Self::Env(_) | Self::ConfigFile(_) => ErrorCategory::Usage,
            Self::Probe(_) => ErrorCategory::EnvironmentProbe,
            Self::Tool(err) => tool_category(err),
            Self::Toolchain(err) => match err {
                ToolchainError::Tool(err) => tool_category(err),
                ToolchainError::Pin(err) => pin_category(err),
                ToolchainError::Probe(_) | ToolchainError::CommitMismatch { .. } => {
                    ErrorCategory::EnvironmentProbe
                }
            },
            Self::Sysroot(err) => match err {
                SysrootError::SetupFailed(err) => tool_category(err),
                SysrootError::EmptyOutput { .. } => ErrorCategory::EnvironmentProbe,
            },
            Self::Sync(err) => match err {
                SyncError::Race { .. } => ErrorCategory::SyncRace,
                SyncError::Collision { .. } => ErrorCategory::SyncCollision,
                SyncError::Probe(_)
                | SyncError::ProxyStart { .. }
                | SyncError::ProxyExited { .. } => ErrorCategory::EnvironmentProbe,
                SyncError::Tool(err) | SyncError::MergeFailed(err) => tool_category(err),
                SyncError::Pin(err) => pin_category(err),
                SyncError::DirtyWorkingTree
                | SyncError::RoundTripMismatch { .. }
                | SyncError::ProxyTimeout { .. } => ErrorCategory::Sync,
            },
            Self::Sweep(SweepError::Spawn(err)) => tool_category(err),
            Self::Bench(err) => match err {
                BenchError::Tool(err) => tool_category(err),
                BenchError::Probe(_) | BenchError::NoBenchmarks { .. } => {
                    ErrorCategory::EnvironmentProbe
                }
                BenchError::UnknownBenchmark { .. } => ErrorCategory::Usage,
                BenchError::Io { .. } | BenchError::Report { .. } => ErrorCategory::Internal,
            },
            Self::Pin(err) => pin_category(err),
            Self::SeedFailed { .. } => ErrorCategory::ExternalTool(None),
            Self::Io(_) => ErrorCategory::Internal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    /// Suggested next steps for the operator.
    pub fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::Usage(_) => &["Run 'miri-ops --help' for the list of commands"],
            Self::Env(_) => &["Unset or correct the listed environment variables"],
            Self::ConfigFile(_) => &["Fix or remove miri-ops.toml at the managed root"],
            Self::Probe(ProbeError::RootNotFound { .. }) => &[
                "Run miri-ops from inside the checkout that holds the rust-version file",
                "Or pass --root <dir> / set MIRI_OPS_ROOT",
            ],
            Self::Probe(ProbeError::LibDirMissing { .. }) => &[
                "Run 'miri-ops toolchain' to install the pinned toolchain",
                "Check that 'rustup show active-toolchain' points at the managed toolchain",
            ],
            Self::Probe(ProbeError::MissingTool { .. }) => {
                &["Install the missing tool and make sure it is on PATH"]
            }
            Self::Toolchain(ToolchainError::CommitMismatch { .. }) => &[
                "Remove the toolchain with 'rustup toolchain uninstall' and retry",
                "Check that the installer fetched the commit from the version pin",
            ],
            Self::Sysroot(_) => &[
                "Run 'miri-ops toolchain' to make sure the pinned toolchain is installed",
                "Re-run with MIRI_OPS_LOG=debug to see the sysroot build command",
            ],
            Self::Sync(SyncError::Race { .. }) => &["Upstream moved during the pull; run it again"],
            Self::Sync(SyncError::Collision { .. }) => {
                &["Delete the branch on your fork or choose another branch name"]
            }
            Self::Sync(SyncError::DirtyWorkingTree) => {
                &["Commit or stash local changes before pulling"]
            }
            Self::Sync(SyncError::MergeFailed(_)) => &[
                "Resolve the conflicts, then 'git commit' to finish the merge",
                "The version pin was already updated in a separate commit",
            ],
            Self::Sync(SyncError::RoundTripMismatch { .. }) => &[
                "Do NOT merge the pushed branch into rustc",
                "Check the bridge filter and proxy cache, then push again",
            ],
            Self::Sync(SyncError::ProxyExited { .. }) => &[
                "Check that nothing else is bound to sync.bridge_port",
                "Run josh-proxy by hand to see why it exits",
            ],
            Self::Sync(SyncError::ProxyStart { .. } | SyncError::ProxyTimeout { .. }) => &[
                "Install josh-proxy with 'cargo install josh-proxy'",
                "Or start the proxy yourself and disable sync.start_proxy",
            ],
            Self::Bench(BenchError::UnknownBenchmark { .. }) => {
                &["Run 'miri-ops bench' without names to run every benchmark"]
            }
            _ => &[],
        }
    }
}

fn tool_category(err: &ProcessError) -> ErrorCategory {
    match err {
        ProcessError::Failed { code, .. } => ErrorCategory::ExternalTool(*code),
        ProcessError::Spawn { .. } => ErrorCategory::EnvironmentProbe,
    }
}

fn pin_category(err: &PinError) -> ErrorCategory {
    match err {
        PinError::Read { .. } | PinError::Malformed { .. } => ErrorCategory::EnvironmentProbe,
        PinError::Write { .. } => ErrorCategory::Internal,
    }
}
