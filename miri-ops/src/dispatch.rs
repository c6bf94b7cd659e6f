//! Routing of parsed commands to their implementation.

use crate::cli::{Cli, Command};
use crate::commands::{bootstrap, pipeline, sync};
use miri_ops_common::config::SeedConfig;
use miri_ops_common::{CommandRunner, EnvSettings, OpsConfig, OpsContext, OpsError, discover_root};
use std::path::Path;
use tracing::debug;

/// How much of the environment a command needs before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Runs before the toolchain can be relied on: no auto ops, no environment
    /// preparation.
    Bootstrap,
    /// History sync with upstream.
    Sync,
    /// Auto ops, environment preparation, then the command.
    MainPipeline,
}

impl Command {
    pub fn class(&self) -> CommandClass {
        match self {
            Self::Toolchain(_) | Self::ManySeeds { .. } | Self::Bench { .. } => {
                CommandClass::Bootstrap
            }
            Self::RustcPull | Self::RustcPush { .. } => CommandClass::Sync,
            Self::Install(_)
            | Self::Build(_)
            | Self::Check(_)
            | Self::Test(_)
            | Self::Bless(_)
            | Self::Run(_)
            | Self::Fmt(_)
            | Self::Clippy(_)
            | Self::Cargo(_) => CommandClass::MainPipeline,
        }
    }
}

pub fn dispatch(
    cli: &Cli,
    env: EnvSettings,
    cwd: &Path,
    runner: &dyn CommandRunner,
) -> Result<(), OpsError> {
    let class = cli.command.class();
    debug!(?class, command = ?cli.command, "dispatching");

    if let Command::ManySeeds { command } = &cli.command {
        // The sweep runs wherever it is invoked; a discovered checkout only
        // contributes its seed settings. An explicit root must exist.
        let seeds = match cli.root.as_deref() {
            Some(explicit) => OpsConfig::load(&discover_root(Some(explicit), cwd)?)?.seeds,
            None => match discover_root(None, cwd) {
                Ok(root) => OpsConfig::load(&root)?.seeds,
                Err(err) => {
                    debug!(error = %err, "no managed root, using default seed range");
                    SeedConfig::default()
                }
            },
        };
        return bootstrap::many_seeds(runner, &env, &seeds, command);
    }

    let root = discover_root(cli.root.as_deref(), cwd)?;
    let config = OpsConfig::load(&root)?;
    debug!(root = %root.display(), "managed root");
    let ctx = OpsContext::new(root, env, config);

    match class {
        CommandClass::Bootstrap => bootstrap::run(runner, &ctx, &cli.command),
        CommandClass::Sync => sync::run(runner, &ctx, &cli.command),
        CommandClass::MainPipeline => pipeline::run(runner, &ctx, &cli.command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Forwarded;
    use miri_ops_common::mock::{MockReply, MockRunner};
    use miri_ops_common::{ProbeError, VersionPin};
    use std::fs;

    fn cli(command: Command, root: Option<&Path>) -> Cli {
        Cli {
            command,
            root: root.map(Path::to_path_buf),
            verbose: false,
        }
    }

    #[test]
    fn test_command_classes() {
        let fwd = Forwarded::default;
        assert_eq!(Command::Toolchain(fwd()).class(), CommandClass::Bootstrap);
        assert_eq!(
            Command::ManySeeds { command: vec!["true".to_string()] }.class(),
            CommandClass::Bootstrap
        );
        assert_eq!(
            Command::Bench {
                save_baseline: None,
                load_baseline: None,
                names: Vec::new()
            }
            .class(),
            CommandClass::Bootstrap
        );
        assert_eq!(Command::RustcPull.class(), CommandClass::Sync);
        for command in [
            Command::Install(fwd()),
            Command::Build(fwd()),
            Command::Check(fwd()),
            Command::Test(fwd()),
            Command::Bless(fwd()),
            Command::Run(fwd()),
            Command::Fmt(fwd()),
            Command::Clippy(fwd()),
            Command::Cargo(fwd()),
        ] {
            assert_eq!(command.class(), CommandClass::MainPipeline, "{command:?}");
        }
    }

    #[test]
    fn test_missing_root_is_probe_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::succeeding();

        let err = dispatch(
            &cli(Command::Build(Forwarded::default()), None),
            EnvSettings::default(),
            dir.path(),
            &runner,
        )
        .unwrap_err();

        assert!(matches!(err, OpsError::Probe(ProbeError::RootNotFound { .. })));
        assert_eq!(err.exit_code(), 2);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_root_is_discovered_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        VersionPin::new("c8dfcfe046a7680554bf4eb612bad840e7631c4b")
            .write(&dir.path().join("rust-version"))
            .unwrap();
        let nested = dir.path().join("src/shims");
        fs::create_dir_all(&nested).unwrap();
        let runner = MockRunner::new(|cmd| {
            if cmd.matches("rustup", &["show", "active-toolchain"]) {
                MockReply::stdout("miri (directory override)\n")
            } else {
                MockReply::ok()
            }
        });

        dispatch(
            &cli(Command::Bench {
                save_baseline: None,
                load_baseline: None,
                names: Vec::new(),
            }, None),
            EnvSettings::default(),
            &nested,
            &runner,
        )
        .unwrap_err();

        let probe = &runner.calls()[0];
        assert_eq!(probe.cwd.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_many_seeds_runs_without_root() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::succeeding();
        let env = EnvSettings {
            seed_count: Some(3),
            ..EnvSettings::default()
        };

        dispatch(
            &cli(Command::ManySeeds { command: vec!["true".to_string()] }, None),
            env,
            dir.path(),
            &runner,
        )
        .unwrap();

        assert_eq!(runner.count("true", &[]), 3);
    }

    #[test]
    fn test_many_seeds_with_missing_explicit_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::succeeding();

        let err = dispatch(
            &cli(
                Command::ManySeeds { command: vec!["true".to_string()] },
                Some(&dir.path().join("gone")),
            ),
            EnvSettings::default(),
            dir.path(),
            &runner,
        )
        .unwrap_err();

        assert!(matches!(err, OpsError::Probe(ProbeError::RootNotFound { .. })));
        assert_eq!(err.exit_code(), 2);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_many_seeds_uses_explicit_root_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("miri-ops.toml"), "[seeds]\ncount = 2\n").unwrap();
        let runner = MockRunner::succeeding();

        dispatch(
            &cli(
                Command::ManySeeds { command: vec!["true".to_string()] },
                Some(dir.path()),
            ),
            EnvSettings::default(),
            Path::new("/"),
            &runner,
        )
        .unwrap();

        assert_eq!(runner.count("true", &[]), 2);
    }

    #[test]
    fn test_bench_installs_before_timing() {
        let dir = tempfile::tempdir().unwrap();
        VersionPin::new("c8dfcfe046a7680554bf4eb612bad840e7631c4b")
            .write(&dir.path().join("rust-version"))
            .unwrap();
        fs::create_dir_all(dir.path().join("bench-cargo-miri/mse")).unwrap();
        let toolchain_dir = tempfile::tempdir().unwrap();
        fs::create_dir(toolchain_dir.path().join("lib")).unwrap();
        let runner = MockRunner::new(|cmd| {
            if cmd.matches("rustup", &["show", "active-toolchain"]) {
                MockReply::stdout("miri (directory override)\n")
            } else if cmd.matches("rustc", &["+miri", "--print", "sysroot"]) {
                MockReply::stdout(format!("{}\n", toolchain_dir.path().display()))
            } else {
                MockReply::ok()
            }
        });

        dispatch(
            &cli(
                Command::Bench {
                    save_baseline: None,
                    load_baseline: None,
                    names: Vec::new(),
                },
                Some(dir.path()),
            ),
            EnvSettings::default(),
            Path::new("/"),
            &runner,
        )
        .unwrap();

        let hyperfine = runner.position("hyperfine", &[]).unwrap();
        let calls = runner.calls();
        let installs: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.matches("cargo", &["+miri", "install"]))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(installs.len(), 2);
        assert!(installs.iter().all(|&i| i < hyperfine));
    }

    #[test]
    fn test_invalid_config_file_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rust-version"), "c8dfcfe046a7680554bf4eb612bad840e7631c4b\n")
            .unwrap();
        fs::write(dir.path().join("miri-ops.toml"), "[toolchain\n").unwrap();
        let runner = MockRunner::succeeding();

        let err = dispatch(
            &cli(Command::Toolchain(Forwarded::default()), Some(dir.path())),
            EnvSettings::default(),
            Path::new("/"),
            &runner,
        )
        .unwrap_err();

        assert!(matches!(err, OpsError::ConfigFile(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
