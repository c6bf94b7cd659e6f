//! Shared orchestration logic for miri-ops.
//!
//! The library holds every component the `miri-ops` binary drives: toolchain
//! reconciliation, sysroot preparation, the auto-ops gate, history sync, seed
//! sweeps and benchmarks. All external tools are reached through
//! [`process::CommandRunner`], so each component can be tested against
//! [`mock::MockRunner`].

pub mod auto_ops;
pub mod bench;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod mock;
pub mod pin;
pub mod probe;
pub mod process;
pub mod seeds;
pub mod sync;
pub mod sysroot;
pub mod toolchain;

pub use auto_ops::{AutoOpsGate, AutoOpsReport, AutoStep, AutoSteps, SyncMarkers};
pub use bench::{BaselineOptions, BenchError, BenchReport, BenchRunner};
pub use config::{EnvError, EnvParser, EnvSettings, OpsConfig};
pub use context::{OpsContext, discover_root};
pub use error::{ErrorCategory, OpsError};
pub use logging::{LogConfig, LoggingGuards, init_logging};
pub use pin::{PinError, VersionPin};
pub use probe::{ProbeError, StateProbe};
pub use process::{Captured, CommandRunner, ProcessError, SystemRunner, ToolCommand};
pub use seeds::{SeedRange, SeedSweeper, SweepError, SweepOutcome};
pub use sync::{HistoryBridge, PullOutcome, PushOutcome, SyncError};
pub use sysroot::{SetupCommand, SysrootCache, SysrootError, SysrootHandle};
pub use toolchain::{ToolchainError, ToolchainManager, ToolchainOutcome};
