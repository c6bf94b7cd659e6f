//! Command-line definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "miri-ops")]
#[command(
    author,
    version,
    about = "Build, test and upstream-sync orchestrator for the Miri interpreter"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Managed root (defaults to the nearest ancestor holding a rust-version file)
    #[arg(long, global = true, env = "MIRI_OPS_ROOT", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Arguments forwarded verbatim to the underlying tool.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Forwarded {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install the driver and cargo wrapper into the cargo bin directory
    Install(Forwarded),

    /// Build the driver and cargo wrapper
    Build(Forwarded),

    /// Check the driver and cargo wrapper, including all targets
    Check(Forwarded),

    /// Build a sysroot and run the test suite
    Test(Forwarded),

    /// Run the test suite and update reference output
    Bless(Forwarded),

    /// Build the driver and run it on the given arguments
    Run(Forwarded),

    /// Format every Rust source file in the checkout
    #[command(alias = "format")]
    Fmt(Forwarded),

    /// Lint the driver and cargo wrapper with clippy
    #[command(alias = "lint")]
    Clippy(Forwarded),

    /// Run cargo with the managed toolchain
    Cargo(Forwarded),

    /// Run a command once per interpreter seed until it fails
    ManySeeds {
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "COMMAND"
        )]
        command: Vec<String>,
    },

    /// Time the interpreter on the benchmark projects
    Bench {
        /// Save the results as a JSON baseline
        #[arg(long, value_name = "FILE")]
        save_baseline: Option<PathBuf>,

        /// Compare the results against a saved baseline
        #[arg(long, value_name = "FILE")]
        load_baseline: Option<PathBuf>,

        /// Benchmarks to run (default: all)
        names: Vec<String>,
    },

    /// Install the toolchain named by the rust-version file
    Toolchain(Forwarded),

    /// Merge the latest upstream changes into this checkout
    RustcPull,

    /// Push this checkout's history to a branch on a rustc fork
    RustcPush {
        /// GitHub user owning the fork
        user: String,

        /// Branch to create on the fork
        branch: String,
    },
}
