//! Main-pipeline commands: everything that builds, tests or runs the driver.
//!
//! Flow: auto ops (at most once) → environment preparation → sysroot (for
//! commands that execute the driver) → the requested cargo/rustfmt call.

use crate::cli::Command;
use miri_ops_common::auto_ops::{AutoOpsGate, AutoSteps, SyncMarkers};
use miri_ops_common::config::env::{
    CARGO_PROFILE_DEV_OPT_LEVEL, CARGO_TARGET_DIR, RUSTC_BLESS, RUSTFLAGS,
};
use miri_ops_common::{
    CommandRunner, OpsContext, OpsError, SetupCommand, StateProbe, SysrootCache, SysrootHandle,
    ToolCommand, ToolchainManager, ToolchainOutcome,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const BLESS_VALUE: &str = "Gesundheit";
const RUSTFMT_EDITION: &str = "--edition=2021";
/// Files per rustfmt invocation, to stay clear of argument-length limits.
const RUSTFMT_BATCH: usize = 256;

/// Environment shared by every cargo call of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiriEnv {
    pub toolchain: String,
    vars: Vec<(String, String)>,
}

impl MiriEnv {
    /// Probe the active toolchain and derive the build environment from it.
    pub fn prepare(runner: &dyn CommandRunner, ctx: &OpsContext) -> Result<Self, OpsError> {
        let probe = StateProbe::new(runner, ctx.root());
        let toolchain = probe.active_toolchain()?;
        let lib_dir = probe.lib_dir(&toolchain)?;

        // The driver links against rustc's shared libraries.
        let rpath = format!("-C link-args=-Wl,-rpath,{}", lib_dir.display());
        let rustflags = match &ctx.env.rustflags {
            Some(existing) => format!("{rpath} {existing}"),
            None => rpath,
        };

        let vars = vec![
            (RUSTFLAGS.to_string(), rustflags),
            (
                CARGO_TARGET_DIR.to_string(),
                ctx.target_dir().to_string_lossy().into_owned(),
            ),
            (
                CARGO_PROFILE_DEV_OPT_LEVEL.to_string(),
                ctx.env.dev_opt_level.clone(),
            ),
        ];
        debug!(toolchain = %toolchain, lib_dir = %lib_dir.display(), "prepared build environment");

        Ok(Self { toolchain, vars })
    }

    /// `cargo +<toolchain>` with the build environment applied.
    pub fn cargo(&self, ctx: &OpsContext) -> ToolCommand {
        ctx.command("cargo")
            .arg(format!("+{}", self.toolchain))
            .envs(self.vars.iter().cloned())
    }
}

/// `--target T` or `--target=T` among forwarded arguments.
pub fn scan_target(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--target" {
            return iter.next().cloned();
        }
        if let Some(target) = arg.strip_prefix("--target=") {
            return Some(target.to_string());
        }
    }
    None
}

/// Every `*.rs` file under `root`, skipping `target` and hidden directories.
pub fn rust_sources(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || is_source_dir(entry.file_name())
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "rs") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_source_dir(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name != "target" && !name.starts_with('.')
}

pub struct Pipeline<'a> {
    runner: &'a dyn CommandRunner,
    ctx: &'a OpsContext,
    env: Option<MiriEnv>,
    sysroots: SysrootCache,
}

impl<'a> Pipeline<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ctx: &'a OpsContext) -> Self {
        Self {
            runner,
            ctx,
            env: None,
            sysroots: SysrootCache::new(ctx.env.sysroot.clone()),
        }
    }

    /// Build environment, prepared on first use.
    fn env(&mut self) -> Result<&MiriEnv, OpsError> {
        let env = match self.env.take() {
            Some(env) => env,
            None => MiriEnv::prepare(self.runner, self.ctx)?,
        };
        Ok(self.env.insert(env))
    }

    fn cargo(&mut self) -> Result<ToolCommand, OpsError> {
        let ctx = self.ctx;
        Ok(self.env()?.cargo(ctx))
    }

    /// `cargo +tc <subcommand> <CARGO_EXTRA_FLAGS> --manifest-path <manifest> ...`
    fn cargo_on(&mut self, subcommand: &str, manifest: &Path) -> Result<ToolCommand, OpsError> {
        Ok(self
            .cargo()?
            .arg(subcommand)
            .args(self.ctx.env.cargo_extra_flags.iter().cloned())
            .arg("--manifest-path")
            .arg_path(manifest))
    }

    fn sysroot(&mut self, target: Option<&str>) -> Result<SysrootHandle, OpsError> {
        let setup = SetupCommand {
            cargo: self.cargo()?,
            manifest: self.ctx.cargo_miri_manifest(),
            extra_flags: self.ctx.env.cargo_extra_flags.clone(),
        };
        Ok(self.sysroots.ensure(self.runner, &setup, target)?)
    }

    /// Run one main-pipeline command.
    pub fn execute(&mut self, command: &Command) -> Result<(), OpsError> {
        match command {
            Command::Install(fwd) => self.install(&fwd.args),
            Command::Build(fwd) => self.build(&fwd.args),
            Command::Check(fwd) => self.check(&fwd.args),
            Command::Test(fwd) => self.test(&fwd.args, false),
            Command::Bless(fwd) => self.test(&fwd.args, true),
            Command::Run(fwd) => self.run(&fwd.args),
            Command::Fmt(fwd) => self.fmt(&fwd.args),
            Command::Clippy(fwd) => self.clippy(&fwd.args),
            Command::Cargo(fwd) => self.cargo_passthrough(&fwd.args),
            other => Err(OpsError::usage(format!(
                "{other:?} is not a build/test command"
            ))),
        }
    }

    /// Toolchain the build environment was prepared for.
    pub fn toolchain(&mut self) -> Result<String, OpsError> {
        Ok(self.env()?.toolchain.clone())
    }

    /// `cargo install` the driver and the cargo wrapper from the checkout.
    pub fn install(&mut self, args: &[String]) -> Result<(), OpsError> {
        let root = self.ctx.root().to_path_buf();
        for path in [root.clone(), root.join("cargo-miri")] {
            let cmd = self
                .cargo()?
                .arg("install")
                .args(self.ctx.env.cargo_extra_flags.iter().cloned())
                .arg("--path")
                .arg_path(&path)
                .args(["--force", "--locked", "--offline"])
                .args(args.iter().cloned());
            self.runner.run(&cmd)?;
        }
        Ok(())
    }

    fn build(&mut self, args: &[String]) -> Result<(), OpsError> {
        for manifest in [self.ctx.driver_manifest(), self.ctx.cargo_miri_manifest()] {
            let cmd = self.cargo_on("build", &manifest)?.args(args.iter().cloned());
            self.runner.run(&cmd)?;
        }
        Ok(())
    }

    fn check(&mut self, args: &[String]) -> Result<(), OpsError> {
        for manifest in [self.ctx.driver_manifest(), self.ctx.cargo_miri_manifest()] {
            let cmd = self
                .cargo_on("check", &manifest)?
                .arg("--all-targets")
                .args(args.iter().cloned());
            self.runner.run(&cmd)?;
        }
        Ok(())
    }

    fn clippy(&mut self, args: &[String]) -> Result<(), OpsError> {
        for manifest in [self.ctx.driver_manifest(), self.ctx.cargo_miri_manifest()] {
            let cmd = self
                .cargo_on("clippy", &manifest)?
                .arg("--all-targets")
                .args(args.iter().cloned());
            self.runner.run(&cmd)?;
        }
        Ok(())
    }

    fn test(&mut self, args: &[String], bless: bool) -> Result<(), OpsError> {
        let ctx = self.ctx;
        let build = self.cargo_on("build", &ctx.cargo_miri_manifest())?;
        self.runner.run(&build)?;

        let sysroot = self.sysroot(ctx.env.test_target.as_deref())?;
        let test = self
            .cargo_on("test", &ctx.driver_manifest())?
            .args(args.iter().cloned());
        let mut cmd = sysroot.export(test);
        if bless {
            cmd = cmd.env(RUSTC_BLESS, BLESS_VALUE);
        }
        self.runner.run(&cmd)?;
        Ok(())
    }

    fn run(&mut self, args: &[String]) -> Result<(), OpsError> {
        let ctx = self.ctx;
        let explicit = scan_target(args);
        let target = explicit.clone().or_else(|| ctx.env.test_target.clone());

        let build = self.cargo_on("build", &ctx.driver_manifest())?;
        self.runner.run(&build)?;

        let sysroot = self.sysroot(target.as_deref())?;
        let run = self.cargo_on("run", &ctx.driver_manifest())?;
        let mut cmd = sysroot
            .export(run)
            .arg("--")
            .args(ctx.env.miri_flags.iter().cloned())
            .arg("--sysroot")
            .arg_path(sysroot.path());
        if explicit.is_none()
            && let Some(target) = &target
        {
            cmd = cmd.args(["--target", target.as_str()]);
        }
        self.runner.run(&cmd.args(args.iter().cloned()))?;
        Ok(())
    }

    fn fmt(&mut self, args: &[String]) -> Result<(), OpsError> {
        let toolchain = self.env()?.toolchain.clone();
        let root = self.ctx.root();
        let files = rust_sources(root)?;
        if files.is_empty() {
            info!("no Rust sources to format");
            return Ok(());
        }

        for batch in files.chunks(RUSTFMT_BATCH) {
            let mut cmd = self
                .ctx
                .command("rustfmt")
                .arg(format!("+{toolchain}"))
                .arg(RUSTFMT_EDITION)
                .arg("--config-path")
                .arg_path(&root.join("rustfmt.toml"))
                .args(args.iter().cloned());
            for file in batch {
                cmd = cmd.arg_path(file);
            }
            self.runner.run(&cmd)?;
        }
        Ok(())
    }

    fn cargo_passthrough(&mut self, args: &[String]) -> Result<(), OpsError> {
        let cmd = self.cargo()?.args(args.iter().cloned());
        self.runner.run(&cmd)?;
        Ok(())
    }
}

impl AutoSteps for Pipeline<'_> {
    fn sync_toolchain(&mut self) -> Result<(), OpsError> {
        match ToolchainManager::new(self.runner, self.ctx).sync_from_pin(&[])? {
            ToolchainOutcome::Unchanged { commit } => {
                info!(commit = %commit, "auto: toolchain already matches the version pin");
            }
            ToolchainOutcome::Installed { previous, commit } => {
                info!(
                    commit = %commit,
                    previous = previous.as_deref().unwrap_or("not installed"),
                    "auto: installed toolchain"
                );
            }
        }
        // The active toolchain may have changed underneath a prepared environment.
        self.env = None;
        Ok(())
    }

    fn format(&mut self) -> Result<(), OpsError> {
        self.fmt(&[])
    }

    fn lint(&mut self, flags: &[String]) -> Result<(), OpsError> {
        let args: Vec<String> = std::iter::once("--".to_string())
            .chain(flags.iter().cloned())
            .collect();
        self.clippy(&args)
    }
}

/// Auto ops, then `command`.
pub fn run(
    runner: &dyn CommandRunner,
    ctx: &OpsContext,
    command: &Command,
) -> Result<(), OpsError> {
    let mut pipeline = Pipeline::new(runner, ctx);
    let mut gate = AutoOpsGate::new(ctx);
    let report = gate.run_once(SyncMarkers::detect(ctx.root()), &mut pipeline)?;
    debug!(?report, "auto ops finished");
    pipeline.execute(command)
}
