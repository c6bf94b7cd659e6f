//! Environment variable parsing.
//!
//! The orchestrator is driven by a fixed set of variables shared with the
//! driver's own tooling (`MIRIFLAGS`, `MIRI_SYSROOT`, ...). They are read once
//! into an immutable [`EnvSettings`]; nothing reads the process environment
//! after startup.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub const MIRI_SYSROOT: &str = "MIRI_SYSROOT";
pub const CARGO_EXTRA_FLAGS: &str = "CARGO_EXTRA_FLAGS";
pub const MIRIFLAGS: &str = "MIRIFLAGS";
pub const MIRI_TEST_TARGET: &str = "MIRI_TEST_TARGET";
pub const MIRI_AUTO_OPS: &str = "MIRI_AUTO_OPS";
pub const CARGO_TARGET_DIR: &str = "CARGO_TARGET_DIR";
pub const CARGO_PROFILE_DEV_OPT_LEVEL: &str = "CARGO_PROFILE_DEV_OPT_LEVEL";
pub const RUSTFLAGS: &str = "RUSTFLAGS";
pub const RUSTC_GIT: &str = "RUSTC_GIT";
pub const RUSTC_BLESS: &str = "RUSTC_BLESS";
/// Read by the CLI's `--root` flag.
pub const MIRI_OPS_ROOT: &str = "MIRI_OPS_ROOT";
pub const MIRI_SEED_START: &str = "MIRI_SEED_START";
pub const MIRI_SEEDS: &str = "MIRI_SEEDS";

/// Value exported to children so nested invocations skip auto ops.
pub const AUTO_OPS_SENTINEL: &str = "42";

const DEFAULT_DEV_OPT_LEVEL: &str = "2";

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },
}

type Lookup<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// Environment parser that collects every error instead of stopping at the first.
pub struct EnvParser<'a> {
    lookup: Lookup<'a>,
    errors: Vec<EnvError>,
}

impl<'a> EnvParser<'a> {
    /// Parse from the current process environment.
    pub fn from_process() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Parse from an explicit variable map.
    pub fn from_map(vars: &'a HashMap<String, String>) -> Self {
        Self::with_lookup(move |name| vars.get(name).cloned())
    }

    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'a) -> Self {
        Self {
            lookup: Box::new(lookup),
            errors: Vec::new(),
        }
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> String {
        self.get_optional_string(name)
            .unwrap_or_else(|| default.to_string())
    }

    /// Get an optional path (None if not set or empty).
    pub fn get_optional_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_optional_string(name).map(PathBuf::from)
    }

    /// Get a whitespace-separated flag list.
    pub fn get_flags(&mut self, name: &str) -> Vec<String> {
        self.get_optional_string(name)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Whether a variable is present at all, even if empty.
    pub fn is_set(&mut self, name: &str) -> bool {
        (self.lookup)(name).is_some()
    }

    /// Get a u32 value with default and range validation.
    pub fn get_u32_range(&mut self, name: &str, default: u32, min: u32, max: u32) -> u32 {
        match self.get_optional_string(name) {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(n) if n >= min && n <= max => n,
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: name.to_string(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    default
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: name.to_string(),
                        expected: "unsigned 32-bit integer".to_string(),
                        value,
                    });
                    default
                }
            },
            None => default,
        }
    }
}

/// Settings taken from the environment at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    /// Pre-built sysroot supplied by the caller (`MIRI_SYSROOT`).
    pub sysroot: Option<PathBuf>,
    /// Flags appended to every cargo invocation (`CARGO_EXTRA_FLAGS`).
    pub cargo_extra_flags: Vec<String>,
    /// Flags for the driver (`MIRIFLAGS`).
    pub miri_flags: Vec<String>,
    /// Cross-target for tests and sysroot builds (`MIRI_TEST_TARGET`).
    pub test_target: Option<String>,
    /// The recursion sentinel was inherited (`MIRI_AUTO_OPS`).
    pub auto_ops_running: bool,
    /// Build-artifact directory override (`CARGO_TARGET_DIR`).
    pub target_dir: Option<PathBuf>,
    /// Dev-profile optimization level (`CARGO_PROFILE_DEV_OPT_LEVEL`).
    pub dev_opt_level: String,
    /// Caller-provided rustflags, kept after our own (`RUSTFLAGS`).
    pub rustflags: Option<String>,
    /// Full upstream clone used by `rustc-push` (`RUSTC_GIT`).
    pub rustc_git: Option<PathBuf>,
    /// First seed of a sweep (`MIRI_SEED_START`).
    pub seed_start: Option<u32>,
    /// Number of seeds in a sweep (`MIRI_SEEDS`).
    pub seed_count: Option<u32>,
}

impl EnvSettings {
    /// Read settings from the process environment.
    pub fn from_process() -> Result<Self, Vec<EnvError>> {
        Self::parse(&mut EnvParser::from_process())
    }

    /// Read settings through `parser`, reporting every invalid variable.
    pub fn parse(parser: &mut EnvParser<'_>) -> Result<Self, Vec<EnvError>> {
        let seed_start = parser
            .is_set(MIRI_SEED_START)
            .then(|| parser.get_u32_range(MIRI_SEED_START, 0, 0, u32::MAX / 2));
        let seed_count = parser
            .is_set(MIRI_SEEDS)
            .then(|| parser.get_u32_range(MIRI_SEEDS, 256, 1, 1 << 20));

        let settings = Self {
            sysroot: parser.get_optional_path(MIRI_SYSROOT),
            cargo_extra_flags: parser.get_flags(CARGO_EXTRA_FLAGS),
            miri_flags: parser.get_flags(MIRIFLAGS),
            test_target: parser.get_optional_string(MIRI_TEST_TARGET),
            auto_ops_running: parser.is_set(MIRI_AUTO_OPS),
            target_dir: parser.get_optional_path(CARGO_TARGET_DIR),
            dev_opt_level: parser.get_string(CARGO_PROFILE_DEV_OPT_LEVEL, DEFAULT_DEV_OPT_LEVEL),
            rustflags: parser.get_optional_string(RUSTFLAGS),
            rustc_git: parser.get_optional_path(RUSTC_GIT),
            seed_start,
            seed_count,
        };

        if parser.has_errors() {
            Err(parser.take_errors())
        } else {
            Ok(settings)
        }
    }

    /// Variables handed to children that may re-enter the orchestrator.
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut vars = vec![(MIRI_AUTO_OPS.to_string(), AUTO_OPS_SENTINEL.to_string())];
        if let Some(sysroot) = &self.sysroot {
            vars.push((MIRI_SYSROOT.to_string(), sysroot.to_string_lossy().into_owned()));
        }
        vars
    }
}
