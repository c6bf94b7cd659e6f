//! Read-only queries against rustup, rustc and git.
//!
//! Nothing here is cached: every call re-derives state from the tools, so a
//! probe made after an install always sees the new toolchain.

use crate::process::{CommandRunner, ProcessError, ToolCommand};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error("Unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    #[error("Toolchain library directory {path} does not exist")]
    LibDirMissing { path: PathBuf },

    #[error("`{program}` not found on PATH ({hint})")]
    MissingTool { program: String, hint: String },

    #[error("No managed root found from {searched} (looked for a rust-version file)")]
    RootNotFound { searched: PathBuf },
}

/// Inspects the toolchain and repository state of one managed root.
pub struct StateProbe<'a> {
    runner: &'a dyn CommandRunner,
    root: &'a Path,
}

impl<'a> StateProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, root: &'a Path) -> Self {
        Self { runner, root }
    }

    fn command(&self, program: &str) -> ToolCommand {
        ToolCommand::new(program).current_dir(self.root)
    }

    /// Fail with an install hint unless `program` is on `PATH`.
    pub fn require_tool(&self, program: &str, hint: &str) -> Result<PathBuf, ProbeError> {
        self.runner
            .locate(program)
            .ok_or_else(|| ProbeError::MissingTool {
                program: program.to_string(),
                hint: hint.to_string(),
            })
    }

    /// Name of the toolchain rustup resolves for the managed root.
    pub fn active_toolchain(&self) -> Result<String, ProbeError> {
        let cmd = self.command("rustup").args(["show", "active-toolchain"]);
        let out = self.runner.read(&cmd)?;
        parse_active_toolchain(&out).ok_or_else(|| ProbeError::UnexpectedOutput {
            command: cmd.display(),
            output: out,
        })
    }

    /// Upstream commit the toolchain was built from, `None` when it is not
    /// installed (or the probe fails for any other reason).
    pub fn installed_commit(&self, toolchain: &str) -> Result<Option<String>, ProbeError> {
        let cmd = self
            .command("rustc")
            .arg(format!("+{toolchain}"))
            .args(["--version", "--verbose"]);
        let out = self.runner.capture(&cmd)?;
        if !out.success() {
            debug!(toolchain, code = ?out.code, "toolchain probe failed, treating as not installed");
            return Ok(None);
        }
        Ok(parse_commit_hash(&out.stdout))
    }

    pub fn sysroot(&self, toolchain: &str) -> Result<PathBuf, ProbeError> {
        let cmd = self
            .command("rustc")
            .arg(format!("+{toolchain}"))
            .args(["--print", "sysroot"]);
        let out = self.runner.read(&cmd)?;
        if out.is_empty() {
            return Err(ProbeError::UnexpectedOutput {
                command: cmd.display(),
                output: out,
            });
        }
        Ok(PathBuf::from(out))
    }

    /// The toolchain's `lib` directory, which must exist.
    pub fn lib_dir(&self, toolchain: &str) -> Result<PathBuf, ProbeError> {
        let lib = self.sysroot(toolchain)?.join("lib");
        if lib.is_dir() {
            Ok(lib)
        } else {
            Err(ProbeError::LibDirMissing { path: lib })
        }
    }

    /// Commit at the tip of the remote's default branch.
    pub fn remote_head(&self, url: &str) -> Result<String, ProbeError> {
        let cmd = self.command("git").args(["ls-remote", url, "HEAD"]);
        let out = self.runner.read(&cmd)?;
        parse_ls_remote_head(&out).ok_or_else(|| ProbeError::UnexpectedOutput {
            command: cmd.display(),
            output: out,
        })
    }

    /// Whether `refs/heads/<branch>` exists on the remote.
    pub fn remote_has_branch(&self, url: &str, branch: &str) -> Result<bool, ProbeError> {
        let cmd = self.command("git").args(["ls-remote", "--heads", url]);
        let out = self.runner.read(&cmd)?;
        Ok(ls_remote_has_branch(&out, branch))
    }

    /// Resolve `rev` in the repository at `dir`.
    pub fn git_rev(&self, dir: &Path, rev: &str) -> Result<String, ProbeError> {
        let cmd = ToolCommand::new("git")
            .current_dir(dir)
            .args(["rev-parse", rev]);
        Ok(self.runner.read(&cmd)?)
    }

    /// No modified tracked files in the repository at `dir`.
    pub fn worktree_clean(&self, dir: &Path) -> Result<bool, ProbeError> {
        let cmd = ToolCommand::new("git")
            .current_dir(dir)
            .args(["status", "--untracked-files=no", "--porcelain"]);
        Ok(self.runner.read(&cmd)?.is_empty())
    }
}

/// `rustup show active-toolchain` prints `<name> (<reason>)`.
pub fn parse_active_toolchain(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}

pub fn parse_commit_hash(verbose_version: &str) -> Option<String> {
    parse_verbose_field(verbose_version, "commit-hash").filter(|hash| hash != "unknown")
}

fn parse_verbose_field(verbose_version: &str, field: &str) -> Option<String> {
    verbose_version.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == field)
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

pub fn parse_ls_remote_head(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let sha = parts.next()?;
        (parts.next()? == "HEAD").then(|| sha.to_string())
    })
}

pub fn ls_remote_has_branch(output: &str, branch: &str) -> bool {
    let wanted = format!("refs/heads/{branch}");
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|reference| reference == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockRunner};

    const VERBOSE: &str = "rustc 1.80.0-nightly (c8dfcfe04 2024-05-01)
binary: rustc
commit-hash: c8dfcfe046a7680554bf4eb612bad840e7631c4b
commit-date: 2024-05-01
host: x86_64-unknown-linux-gnu
release: 1.80.0-nightly
LLVM version: 18.1.4
";

    #[test]
    fn test_parse_commit_hash() {
        assert_eq!(
            parse_commit_hash(VERBOSE).as_deref(),
            Some("c8dfcfe046a7680554bf4eb612bad840e7631c4b")
        );
        assert_eq!(parse_commit_hash("rustc 1.0.0\ncommit-hash: unknown\n"), None);
        assert_eq!(parse_commit_hash(""), None);
    }

    #[test]
    fn test_parse_active_toolchain() {
        assert_eq!(
            parse_active_toolchain("miri (directory override for '/work/miri')\n").as_deref(),
            Some("miri")
        );
        assert_eq!(parse_active_toolchain(""), None);
    }

    #[test]
    fn test_parse_ls_remote() {
        let out = "1111111111111111111111111111111111111111\tHEAD\n";
        assert_eq!(
            parse_ls_remote_head(out).as_deref(),
            Some("1111111111111111111111111111111111111111")
        );
        assert_eq!(parse_ls_remote_head(""), None);

        let heads = "aaa\trefs/heads/master\nbbb\trefs/heads/miri-sync\n";
        assert!(ls_remote_has_branch(heads, "miri-sync"));
        assert!(!ls_remote_has_branch(heads, "miri"));
        assert!(!ls_remote_has_branch("", "master"));
    }

    #[test]
    fn test_installed_commit_failure_means_not_installed() {
        let runner = MockRunner::new(|cmd| {
            if cmd.matches("rustc", &["+miri"]) {
                MockReply::fail_with(1, "error: toolchain 'miri' is not installed")
            } else {
                MockReply::ok()
            }
        });
        let probe = StateProbe::new(&runner, Path::new("/work/miri"));
        assert_eq!(probe.installed_commit("miri").unwrap(), None);
    }

    #[test]
    fn test_installed_commit_from_verbose_version() {
        let runner = MockRunner::new(|_| MockReply::stdout(VERBOSE));
        let probe = StateProbe::new(&runner, Path::new("/work/miri"));
        assert_eq!(
            probe.installed_commit("miri").unwrap().as_deref(),
            Some("c8dfcfe046a7680554bf4eb612bad840e7631c4b")
        );
    }

    #[test]
    fn test_lib_dir_must_exist() {
        let sysroot = tempfile::tempdir().unwrap();
        let path = sysroot.path().to_string_lossy().into_owned();
        let runner = MockRunner::new(move |_| MockReply::stdout(format!("{path}\n")));
        let probe = StateProbe::new(&runner, Path::new("/work/miri"));

        let err = probe.lib_dir("miri").unwrap_err();
        assert!(matches!(err, ProbeError::LibDirMissing { .. }));

        std::fs::create_dir(sysroot.path().join("lib")).unwrap();
        assert_eq!(probe.lib_dir("miri").unwrap(), sysroot.path().join("lib"));
    }

    #[test]
    fn test_require_tool() {
        let runner = MockRunner::succeeding().without_program("hyperfine");
        let probe = StateProbe::new(&runner, Path::new("/work/miri"));
        assert!(probe.require_tool("git", "").is_ok());
        let err = probe
            .require_tool("hyperfine", "cargo install hyperfine")
            .unwrap_err();
        assert!(err.to_string().contains("cargo install hyperfine"));
    }

    #[test]
    fn test_worktree_clean() {
        let runner = MockRunner::new(|cmd| {
            if cmd.matches("git", &["status"]) {
                MockReply::stdout(" M src/lib.rs\n")
            } else {
                MockReply::ok()
            }
        });
        let probe = StateProbe::new(&runner, Path::new("/work/miri"));
        assert!(!probe.worktree_clean(Path::new("/work/miri")).unwrap());
    }
}
