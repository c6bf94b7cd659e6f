//! Re-run a command under a range of interpreter seeds.

use crate::config::env::MIRIFLAGS;
use crate::config::{EnvSettings, SeedConfig};
use crate::process::{CommandRunner, ProcessError, ToolCommand};
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SweepError {
    /// The command could not be started at all.
    #[error(transparent)]
    Spawn(ProcessError),
}

/// Seeds `start..start + count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRange {
    pub start: u32,
    pub count: u32,
}

impl SeedRange {
    /// Environment overrides win over the configuration file.
    pub fn resolve(env: &EnvSettings, config: &SeedConfig) -> Self {
        Self {
            start: env.seed_start.unwrap_or(config.start),
            count: env.seed_count.unwrap_or(config.count),
        }
    }

    pub fn seeds(&self) -> Range<u32> {
        self.start..self.start.saturating_add(self.count)
    }
}

impl Default for SeedRange {
    fn default() -> Self {
        Self::resolve(&EnvSettings::default(), &SeedConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    AllPassed { seeds: u32 },
    FailedAtSeed { seed: u32 },
}

/// `MIRIFLAGS` for one iteration: the caller's flags plus this seed.
pub fn seed_flags(base: &[String], seed: u32) -> String {
    base.iter()
        .cloned()
        .chain(std::iter::once(format!("-Zmiri-seed={seed:x}")))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct SeedSweeper<'a> {
    runner: &'a dyn CommandRunner,
    range: SeedRange,
    child_env: Vec<(String, String)>,
}

impl<'a> SeedSweeper<'a> {
    pub fn new(runner: &'a dyn CommandRunner, range: SeedRange) -> Self {
        Self {
            runner,
            range,
            child_env: Vec::new(),
        }
    }

    /// Extra variables for every sub-invocation.
    pub fn with_env(mut self, vars: Vec<(String, String)>) -> Self {
        self.child_env = vars;
        self
    }

    /// Run `command` once per seed, stopping at the first failure.
    pub fn sweep(
        &self,
        base_flags: &[String],
        command: &[String],
    ) -> Result<SweepOutcome, SweepError> {
        let Some((program, args)) = command.split_first() else {
            return Ok(SweepOutcome::AllPassed { seeds: 0 });
        };

        let mut ran = 0;
        for seed in self.range.seeds() {
            println!("Trying seed: {seed:x}");
            let cmd = ToolCommand::new(program.as_str())
                .args(args.iter().cloned())
                .envs(self.child_env.iter().cloned())
                .env(MIRIFLAGS, seed_flags(base_flags, seed));
            match self.runner.run(&cmd) {
                Ok(()) => ran += 1,
                Err(err @ ProcessError::Spawn { .. }) => return Err(SweepError::Spawn(err)),
                Err(err) => {
                    debug!(seed, error = %err, "seed failed");
                    return Ok(SweepOutcome::FailedAtSeed { seed });
                }
            }
        }
        Ok(SweepOutcome::AllPassed { seeds: ran })
    }
}
