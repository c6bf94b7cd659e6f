//! Scripted command runner for tests.
//!
//! `MockRunner` never spawns processes. Each command is recorded and answered
//! by a responder closure, which lets tests model tools whose answers change
//! over time (an upstream HEAD that moves during a fetch, a toolchain that
//! appears after installation).

use crate::process::{Captured, CommandRunner, ProcessError, ToolCommand};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Scripted answer for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Exit 0 with the given stdout.
    Success(String),
    /// Exit with `code` and the given stderr.
    Failure { code: i32, stderr: String },
    /// The program could not be started.
    SpawnError,
}

impl MockReply {
    pub fn ok() -> Self {
        Self::Success(String::new())
    }

    pub fn stdout(out: impl Into<String>) -> Self {
        Self::Success(out.into())
    }

    pub fn fail(code: i32) -> Self {
        Self::Failure {
            code,
            stderr: String::new(),
        }
    }

    pub fn fail_with(code: i32, stderr: impl Into<String>) -> Self {
        Self::Failure {
            code,
            stderr: stderr.into(),
        }
    }
}

type Responder<'a> = Box<dyn Fn(&ToolCommand) -> MockReply + 'a>;

/// Command runner that records invocations and replies from a script.
pub struct MockRunner<'a> {
    responder: Responder<'a>,
    calls: RefCell<Vec<ToolCommand>>,
    missing_programs: BTreeSet<String>,
}

impl<'a> MockRunner<'a> {
    pub fn new(responder: impl Fn(&ToolCommand) -> MockReply + 'a) -> Self {
        Self {
            responder: Box::new(responder),
            calls: RefCell::new(Vec::new()),
            missing_programs: BTreeSet::new(),
        }
    }

    /// A runner where every command succeeds with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_| MockReply::ok())
    }

    /// Make `locate` report `program` as absent from `PATH`.
    pub fn without_program(mut self, program: &str) -> Self {
        self.missing_programs.insert(program.to_string());
        self
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.borrow().clone()
    }

    /// Recorded invocations rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToolCommand::display).collect()
    }

    /// Number of invocations of `program` whose arguments start with `prefix`.
    pub fn count(&self, program: &str, prefix: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.matches(program, prefix))
            .count()
    }

    /// Index of the first invocation matching `program`/`prefix`.
    pub fn position(&self, program: &str, prefix: &[&str]) -> Option<usize> {
        self.calls
            .borrow()
            .iter()
            .position(|c| c.matches(program, prefix))
    }

    fn reply(&self, cmd: &ToolCommand) -> MockReply {
        self.calls.borrow_mut().push(cmd.clone());
        (self.responder)(cmd)
    }
}

impl CommandRunner for MockRunner<'_> {
    fn run(&self, cmd: &ToolCommand) -> Result<(), ProcessError> {
        match self.reply(cmd) {
            MockReply::Success(_) => Ok(()),
            MockReply::Failure { code, stderr } => {
                Err(ProcessError::failed(cmd, Some(code), stderr))
            }
            MockReply::SpawnError => Err(spawn_error(cmd)),
        }
    }

    fn capture(&self, cmd: &ToolCommand) -> Result<Captured, ProcessError> {
        match self.reply(cmd) {
            MockReply::Success(stdout) => Ok(Captured {
                code: Some(0),
                stdout,
                stderr: String::new(),
            }),
            MockReply::Failure { code, stderr } => Ok(Captured {
                code: Some(code),
                stdout: String::new(),
                stderr,
            }),
            MockReply::SpawnError => Err(spawn_error(cmd)),
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if self.missing_programs.contains(program) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }
}

fn spawn_error(cmd: &ToolCommand) -> ProcessError {
    ProcessError::Spawn {
        command: cmd.display(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock: program not found"),
    }
}
