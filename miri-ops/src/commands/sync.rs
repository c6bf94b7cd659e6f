//! `rustc-pull` and `rustc-push`.

use crate::cli::Command;
use miri_ops_common::{CommandRunner, HistoryBridge, OpsContext, OpsError, PullOutcome};
use tracing::info;

pub fn run(
    runner: &dyn CommandRunner,
    ctx: &OpsContext,
    command: &Command,
) -> Result<(), OpsError> {
    let bridge = HistoryBridge::new(runner, ctx);
    match command {
        Command::RustcPull => {
            match bridge.pull()? {
                PullOutcome::Merged { commit } => info!(commit = %commit, "pull merged"),
                PullOutcome::UpToDate { commit } => info!(commit = %commit, "already up to date"),
            }
            Ok(())
        }
        Command::RustcPush { user, branch } => {
            let outcome = bridge.push(user, branch)?;
            info!(branch = %outcome.branch, base = %outcome.base, "push confirmed");
            Ok(())
        }
        other => Err(OpsError::usage(format!("{other:?} is not a sync command"))),
    }
}
