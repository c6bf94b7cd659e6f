//! Toolchain reconciliation.
//!
//! The desired toolchain is the upstream commit named by the version pin. The
//! managed rustup toolchain is reinstalled from that commit whenever the
//! installed one was built from anything else.

use crate::context::OpsContext;
use crate::pin::{PinError, VersionPin};
use crate::probe::{ProbeError, StateProbe};
use crate::process::{CommandRunner, ProcessError};
use thiserror::Error;
use tracing::{debug, info};

const INSTALLER_HINT: &str = "install it with 'cargo install rustup-toolchain-install-master'";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error(transparent)]
    Pin(#[from] PinError),

    #[error("Installed toolchain reports commit {found:?}, expected {expected}")]
    CommitMismatch {
        expected: String,
        found: Option<String>,
    },
}

/// Result of a reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainOutcome {
    /// The installed toolchain already matched; only the override was refreshed.
    Unchanged { commit: String },
    /// The toolchain was (re)installed.
    Installed {
        previous: Option<String>,
        commit: String,
    },
}

impl ToolchainOutcome {
    pub fn commit(&self) -> &str {
        match self {
            Self::Unchanged { commit } | Self::Installed { commit, .. } => commit,
        }
    }
}

pub struct ToolchainManager<'a> {
    runner: &'a dyn CommandRunner,
    ctx: &'a OpsContext,
}

impl<'a> ToolchainManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ctx: &'a OpsContext) -> Self {
        Self { runner, ctx }
    }

    fn probe(&self) -> StateProbe<'a> {
        StateProbe::new(self.runner, self.ctx.root())
    }

    /// Reconcile against the commit stored in the version pin.
    pub fn sync_from_pin(
        &self,
        install_flags: &[String],
    ) -> Result<ToolchainOutcome, ToolchainError> {
        let pin = VersionPin::read(&self.ctx.pin_path())?;
        self.reconcile(pin.commit(), install_flags)
    }

    /// Make the managed toolchain match `desired` and set it as the
    /// directory override of the managed root.
    pub fn reconcile(
        &self,
        desired: &str,
        install_flags: &[String],
    ) -> Result<ToolchainOutcome, ToolchainError> {
        let name = &self.ctx.config.toolchain.name;
        let probe = self.probe();

        let installed = probe.installed_commit(name)?;
        if installed.as_deref() == Some(desired) {
            debug!(toolchain = %name, commit = desired, "toolchain already up to date");
            self.set_override()?;
            return Ok(ToolchainOutcome::Unchanged {
                commit: desired.to_string(),
            });
        }

        let installer = &self.ctx.config.toolchain.installer;
        probe.require_tool(installer, INSTALLER_HINT)?;

        info!(
            toolchain = %name,
            from = installed.as_deref().unwrap_or("<none>"),
            to = desired,
            "installing toolchain"
        );

        self.runner.run(
            &self
                .ctx
                .command("rustup")
                .args(["toolchain", "uninstall", name.as_str()]),
        )?;

        let mut install = self.ctx.command(installer).args(["-n", name.as_str()]);
        for component in &self.ctx.config.toolchain.components {
            install = install.args(["-c", component.as_str()]);
        }
        let install = install.args(install_flags).args(["--", desired]);
        self.runner.run(&install)?;

        self.set_override()?;
        self.runner.run(&self.ctx.command("cargo").arg("clean"))?;

        let found = probe.installed_commit(name)?;
        if found.as_deref() != Some(desired) {
            return Err(ToolchainError::CommitMismatch {
                expected: desired.to_string(),
                found,
            });
        }

        self.refresh_upstream_lockfile(name)?;

        Ok(ToolchainOutcome::Installed {
            previous: installed,
            commit: desired.to_string(),
        })
    }

    fn set_override(&self) -> Result<(), ToolchainError> {
        let name = self.ctx.config.toolchain.name.as_str();
        self.runner.run(
            &self
                .ctx
                .command("rustup")
                .args(["override", "set", name]),
        )?;
        Ok(())
    }

    /// Have cargo resolve the compiler's own workspace once so its lockfile
    /// is present for rust-analyzer.
    fn refresh_upstream_lockfile(&self, name: &str) -> Result<(), ToolchainError> {
        let sysroot = self.probe().sysroot(name)?;
        let manifest = sysroot
            .join("lib/rustlib/rustc-src/rust/compiler/rustc")
            .join("Cargo.toml");
        let cmd = self
            .ctx
            .command("cargo")
            .args(["metadata", "--format-version", "1", "--manifest-path"])
            .arg_path(&manifest);
        self.runner.read(&cmd)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvSettings, OpsConfig};
    use crate::mock::{MockReply, MockRunner};
    use crate::process::ToolCommand;
    use std::cell::RefCell;

    const PINNED: &str = "c8dfcfe046a7680554bf4eb612bad840e7631c4b";
    const OLD: &str = "0000000000000000000000000000000000000001";

    fn context() -> OpsContext {
        OpsContext::new("/work/miri", EnvSettings::default(), OpsConfig::default())
    }

    fn verbose(commit: &str) -> String {
        format!("rustc 1.80.0-nightly\ncommit-hash: {commit}\nhost: x86_64-unknown-linux-gnu\n")
    }

    /// A rustup/rustc pair whose installed commit changes when the installer runs.
    fn toolchain_world(
        installed: Option<&str>,
        installer_produces: &str,
    ) -> (RefCell<Option<String>>, String) {
        (
            RefCell::new(installed.map(str::to_string)),
            installer_produces.to_string(),
        )
    }

    fn respond(state: &(RefCell<Option<String>>, String), cmd: &ToolCommand) -> MockReply {
        let (installed, produces) = state;
        if cmd.matches("rustc", &["+miri", "--version"]) {
            match installed.borrow().as_deref() {
                Some(commit) => MockReply::stdout(verbose(commit)),
                None => MockReply::fail_with(1, "error: toolchain 'miri' is not installed"),
            }
        } else if cmd.matches("rustup-toolchain-install-master", &[]) {
            *installed.borrow_mut() = Some(produces.clone());
            MockReply::ok()
        } else if cmd.matches("rustup", &["toolchain", "uninstall"]) {
            *installed.borrow_mut() = None;
            MockReply::ok()
        } else if cmd.matches("rustc", &["+miri", "--print", "sysroot"]) {
            MockReply::stdout("/home/dev/.rustup/toolchains/miri\n")
        } else {
            MockReply::ok()
        }
    }

    #[test]
    fn test_matching_commit_only_sets_override() {
        let state = toolchain_world(Some(PINNED), PINNED);
        let runner = MockRunner::new(|cmd| respond(&state, cmd));
        let ctx = context();

        let outcome = ToolchainManager::new(&runner, &ctx)
            .reconcile(PINNED, &[])
            .unwrap();

        assert_eq!(
            outcome,
            ToolchainOutcome::Unchanged {
                commit: PINNED.to_string()
            }
        );
        assert_eq!(runner.count("rustup", &["override", "set", "miri"]), 1);
        assert_eq!(runner.count("rustup-toolchain-install-master", &[]), 0);
        assert_eq!(runner.count("rustup", &["toolchain", "uninstall"]), 0);
        assert_eq!(runner.count("cargo", &["clean"]), 0);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let state = toolchain_world(Some(OLD), PINNED);
        let runner = MockRunner::new(|cmd| respond(&state, cmd));
        let ctx = context();
        let manager = ToolchainManager::new(&runner, &ctx);

        let first = manager.reconcile(PINNED, &[]).unwrap();
        assert!(matches!(first, ToolchainOutcome::Installed { .. }));

        let second = manager.reconcile(PINNED, &[]).unwrap();
        assert!(matches!(second, ToolchainOutcome::Unchanged { .. }));
        assert_eq!(runner.count("rustup-toolchain-install-master", &[]), 1);
    }

    #[test]
    fn test_install_sequence_and_arguments() {
        let state = toolchain_world(Some(OLD), PINNED);
        let runner = MockRunner::new(|cmd| respond(&state, cmd));
        let ctx = context();

        let outcome = ToolchainManager::new(&runner, &ctx)
            .reconcile(PINNED, &["--host".to_string(), "i686-unknown-linux-gnu".to_string()])
            .unwrap();

        assert_eq!(
            outcome,
            ToolchainOutcome::Installed {
                previous: Some(OLD.to_string()),
                commit: PINNED.to_string()
            }
        );

        let uninstall = runner.position("rustup", &["toolchain", "uninstall", "miri"]).unwrap();
        let install = runner.position("rustup-toolchain-install-master", &[]).unwrap();
        let override_set = runner.position("rustup", &["override", "set"]).unwrap();
        let clean = runner.position("cargo", &["clean"]).unwrap();
        let metadata = runner.position("cargo", &["metadata"]).unwrap();
        assert!(uninstall < install && install < override_set);
        assert!(override_set < clean && clean < metadata);

        let calls = runner.calls();
        let installer = &calls[install];
        assert_eq!(
            installer.display(),
            format!(
                "rustup-toolchain-install-master -n miri -c cargo -c rust-src -c rustc-dev \
                 -c llvm-tools -c rustfmt -c clippy --host i686-unknown-linux-gnu -- {PINNED}"
            )
        );

        let metadata = &calls[metadata];
        assert_eq!(
            metadata.arg_after("--manifest-path"),
            Some(
                "/home/dev/.rustup/toolchains/miri/lib/rustlib/rustc-src/rust/compiler/rustc/Cargo.toml"
            )
        );
    }

    #[test]
    fn test_fresh_install_when_not_installed() {
        let state = toolchain_world(None, PINNED);
        let runner = MockRunner::new(|cmd| respond(&state, cmd));
        let ctx = context();

        let outcome = ToolchainManager::new(&runner, &ctx)
            .reconcile(PINNED, &[])
            .unwrap();
        assert_eq!(
            outcome,
            ToolchainOutcome::Installed {
                previous: None,
                commit: PINNED.to_string()
            }
        );
    }

    #[test]
    fn test_missing_installer_fails_before_uninstall() {
        let state = toolchain_world(Some(OLD), PINNED);
        let runner =
            MockRunner::new(|cmd| respond(&state, cmd)).without_program("rustup-toolchain-install-master");
        let ctx = context();

        let err = ToolchainManager::new(&runner, &ctx)
            .reconcile(PINNED, &[])
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Probe(ProbeError::MissingTool { .. })));
        assert_eq!(runner.count("rustup", &["toolchain", "uninstall"]), 0);
    }

    #[test]
    fn test_installer_failure_is_fatal() {
        let runner = MockRunner::new(|cmd| {
            if cmd.matches("rustup-toolchain-install-master", &[]) {
                MockReply::fail_with(1, "error: commit not found in CI artifacts")
            } else if cmd.matches("rustc", &[]) {
                MockReply::fail(1)
            } else {
                MockReply::ok()
            }
        });
        let ctx = context();

        let err = ToolchainManager::new(&runner, &ctx)
            .reconcile(PINNED, &[])
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Tool(_)));
        assert_eq!(runner.count("rustup", &["override"]), 0);
    }

    #[test]
    fn test_post_install_mismatch_is_reported() {
        let state = toolchain_world(Some(OLD), OLD);
        let runner = MockRunner::new(|cmd| respond(&state, cmd));
        let ctx = context();

        let err = ToolchainManager::new(&runner, &ctx)
            .reconcile(PINNED, &[])
            .unwrap_err();
        match err {
            ToolchainError::CommitMismatch { expected, found } => {
                assert_eq!(expected, PINNED);
                assert_eq!(found.as_deref(), Some(OLD));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sync_from_pin_reads_pin_file() {
        let dir = tempfile::tempdir().unwrap();
        VersionPin::new(PINNED).write(&dir.path().join("rust-version")).unwrap();
        let ctx = OpsContext::new(dir.path(), EnvSettings::default(), OpsConfig::default());

        let state = toolchain_world(Some(PINNED), PINNED);
        let runner = MockRunner::new(|cmd| respond(&state, cmd));
        let outcome = ToolchainManager::new(&runner, &ctx).sync_from_pin(&[]).unwrap();
        assert_eq!(outcome.commit(), PINNED);
    }

    #[test]
    fn test_sync_from_missing_pin() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpsContext::new(dir.path(), EnvSettings::default(), OpsConfig::default());
        let runner = MockRunner::succeeding();

        let err = ToolchainManager::new(&runner, &ctx).sync_from_pin(&[]).unwrap_err();
        assert!(matches!(err, ToolchainError::Pin(ref e) if e.is_missing()));
        assert!(runner.calls().is_empty());
    }
}
