//! miri-ops - build, test and upstream-sync orchestrator
//!
//! Keeps a Miri checkout, its pinned nightly toolchain and its interpreter
//! sysroots in a consistent state, and moves history between the checkout
//! and the upstream compiler repository.

#![forbid(unsafe_code)]

mod cli;
mod commands;
mod dispatch;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use cli::Cli;
use miri_ops_common::{EnvSettings, LogConfig, OpsError, SystemRunner, init_logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and are not failures.
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let env = EnvSettings::from_process().map_err(OpsError::from)?;
    let cwd = std::env::current_dir().map_err(OpsError::from)?;
    dispatch::dispatch(cli, env, &cwd, &SystemRunner)?;
    Ok(())
}

fn report(err: &anyhow::Error) -> ExitCode {
    let Some(ops) = err.downcast_ref::<OpsError>() else {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    };

    eprintln!("error: {ops}");
    for hint in ops.remediation() {
        eprintln!("  hint: {hint}");
    }
    ExitCode::from(u8::try_from(ops.exit_code()).unwrap_or(1))
}
