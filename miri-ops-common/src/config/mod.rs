//! Configuration for miri-ops.
//!
//! Two sources, both read once at startup:
//! - Environment variables shared with the driver's tooling
//! - An optional `miri-ops.toml` at the managed root

pub mod env;
pub mod file;

pub use env::{AUTO_OPS_SENTINEL, EnvError, EnvParser, EnvSettings};
pub use file::{
    BenchConfig, CONFIG_FILE_NAME, ConfigFileError, OpsConfig, SeedConfig, SyncConfig,
    ToolchainConfig,
};
