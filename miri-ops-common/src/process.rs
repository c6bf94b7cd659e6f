//! External command execution.
//!
//! Every tool the orchestrator drives (cargo, rustup, rustc, git, rustfmt,
//! hyperfine) is launched through a [`CommandRunner`]. Commands are described
//! by a plain [`ToolCommand`] value so the orchestration logic can be
//! exercised against [`crate::mock::MockRunner`] without the tools installed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Description of one external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument, lossily converted to UTF-8.
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// True if the command is `program` and its arguments start with `prefix`.
    pub fn matches(&self, program: &str, prefix: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= prefix.len()
            && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }

    /// Value following `flag` in the argument list, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    /// Shell-quoted command line, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| shell_escape::escape(part.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_std(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Output of a captured command. A non-zero exit is not an error at this level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Errors from launching external commands.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", describe_failure(command, *code, stderr))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ProcessError {
    pub fn failed(cmd: &ToolCommand, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Failed {
            command: cmd.display(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Exit code of the failed tool, `None` for spawn errors or signals.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            Self::Spawn { .. } => None,
        }
    }
}

fn describe_failure(command: &str, code: Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("`{}` failed with {}", command, status)
    } else {
        format!("`{}` failed with {}:\n{}", command, status, stderr)
    }
}

/// Executes external commands.
///
/// `run` inherits stdio so tool diagnostics reach the operator unmodified;
/// `capture` collects output for probes.
pub trait CommandRunner {
    /// Run a command to completion, failing on a non-zero exit.
    fn run(&self, cmd: &ToolCommand) -> Result<(), ProcessError>;

    /// Run a command and capture its output regardless of exit status.
    fn capture(&self, cmd: &ToolCommand) -> Result<Captured, ProcessError>;

    /// Locate an executable on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Capture a command that must succeed and return its trimmed stdout.
    fn read(&self, cmd: &ToolCommand) -> Result<String, ProcessError> {
        let out = self.capture(cmd)?;
        if out.success() {
            Ok(out.stdout.trim().to_string())
        } else {
            Err(ProcessError::failed(cmd, out.code, out.stderr))
        }
    }
}

/// Runner backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<(), ProcessError> {
        debug!(command = %cmd.display(), cwd = ?cmd.cwd, "running");
        let status = cmd
            .to_std()
            .stdin(Stdio::inherit())
            .status()
            .map_err(|source| ProcessError::Spawn {
                command: cmd.display(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::failed(cmd, status.code(), ""))
        }
    }

    fn capture(&self, cmd: &ToolCommand) -> Result<Captured, ProcessError> {
        debug!(command = %cmd.display(), cwd = ?cmd.cwd, "capturing");
        let output = cmd
            .to_std()
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProcessError::Spawn {
                command: cmd.display(),
                source,
            })?;
        Ok(Captured {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
