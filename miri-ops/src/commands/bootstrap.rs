//! Commands that run without auto ops or environment preparation.

use crate::cli::Command;
use crate::commands::pipeline::Pipeline;
use miri_ops_common::config::SeedConfig;
use miri_ops_common::{
    BaselineOptions, BenchRunner, CommandRunner, EnvSettings, OpsContext, OpsError, SeedRange,
    SeedSweeper, SweepOutcome, ToolchainManager, ToolchainOutcome,
};
use std::path::Path;
use tracing::info;

pub fn run(
    runner: &dyn CommandRunner,
    ctx: &OpsContext,
    command: &Command,
) -> Result<(), OpsError> {
    match command {
        Command::Toolchain(fwd) => toolchain(runner, ctx, &fwd.args),
        Command::Bench {
            save_baseline,
            load_baseline,
            names,
        } => bench(
            runner,
            ctx,
            names,
            save_baseline.as_deref(),
            load_baseline.as_deref(),
        ),
        other => Err(OpsError::usage(format!("{other:?} is not a bootstrap command"))),
    }
}

/// Install the pinned toolchain and make it the directory override.
pub fn toolchain(
    runner: &dyn CommandRunner,
    ctx: &OpsContext,
    install_flags: &[String],
) -> Result<(), OpsError> {
    match ToolchainManager::new(runner, ctx).sync_from_pin(install_flags)? {
        ToolchainOutcome::Unchanged { commit } => {
            info!(commit = %commit, "toolchain already matches the version pin");
        }
        ToolchainOutcome::Installed { previous, commit } => {
            println!(
                "Installed toolchain '{}' at {commit} (was {}).",
                ctx.config.toolchain.name,
                previous.as_deref().unwrap_or("not installed")
            );
        }
    }
    Ok(())
}

/// Run `command` under successive seeds. Does not need a managed root.
pub fn many_seeds(
    runner: &dyn CommandRunner,
    env: &EnvSettings,
    seeds: &SeedConfig,
    command: &[String],
) -> Result<(), OpsError> {
    let range = SeedRange::resolve(env, seeds);
    info!(start = range.start, count = range.count, "sweeping seeds");

    let outcome = SeedSweeper::new(runner, range)
        .with_env(env.child_env())
        .sweep(&env.miri_flags, command)?;
    match outcome {
        SweepOutcome::AllPassed { seeds } => {
            info!(seeds, "every seed passed");
            Ok(())
        }
        SweepOutcome::FailedAtSeed { seed } => Err(OpsError::SeedFailed { seed }),
    }
}

/// Install the current driver, then time the benchmarks with it.
pub fn bench(
    runner: &dyn CommandRunner,
    ctx: &OpsContext,
    names: &[String],
    save: Option<&Path>,
    load: Option<&Path>,
) -> Result<(), OpsError> {
    let mut pipeline = Pipeline::new(runner, ctx);
    pipeline.install(&[])?;
    let toolchain = pipeline.toolchain()?;
    let options = BaselineOptions {
        save: save.map(Path::to_path_buf),
        load: load.map(Path::to_path_buf),
    };
    let report = BenchRunner::new(runner, ctx, toolchain).run(names, &options)?;
    info!(ran = report.ran.len(), "benchmarks finished");
    Ok(())
}
