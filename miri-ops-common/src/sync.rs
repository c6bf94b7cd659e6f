//! History exchange with the upstream tree through a path-filtering proxy.
//!
//! The proxy (josh) serves the upstream repository rewritten to contain only
//! the managed subtree, so `git fetch`/`git push` against it move commits
//! between the two histories. Pull merges upstream into the local checkout;
//! push publishes the local history as a branch on the operator's fork.

use crate::context::OpsContext;
use crate::pin::{PinError, VersionPin};
use crate::probe::{ProbeError, StateProbe};
use crate::process::{CommandRunner, ProcessError, ToolCommand};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const PREPARE_MESSAGE: &str = "Preparing for merge from rustc";
const MERGE_MESSAGE: &str = "Merge from rustc";

const PROXY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROXY_POLL_ATTEMPTS: u32 = 100;
/// Polls to wait for the proxy to exit after SIGINT before killing it.
const PROXY_STOP_ATTEMPTS: u32 = 30;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error(transparent)]
    Pin(#[from] PinError),

    #[error("Upstream HEAD moved from {before} to {after} while fetching; nothing was merged")]
    Race { before: String, after: String },

    #[error("Branch '{branch}' already exists on {user}'s fork; delete it and try again")]
    Collision { user: String, branch: String },

    #[error("Working tree has uncommitted changes to tracked files")]
    DirtyWorkingTree,

    #[error("Merge from upstream failed: {0}")]
    MergeFailed(#[source] ProcessError),

    #[error("Pushed history does not round-trip: local HEAD is {expected}, bridge returned {found}")]
    RoundTripMismatch { expected: String, found: String },

    #[error("Failed to start {program}: {source}")]
    ProxyStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("History proxy exited ({status}) before listening on port {port}")]
    ProxyExited { port: u16, status: String },

    #[error("History proxy did not start listening on port {port}")]
    ProxyTimeout { port: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Upstream changes were merged; the pin now names `commit`.
    Merged { commit: String },
    /// The filtered upstream history had nothing new.
    UpToDate { commit: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Upstream commit the pushed branch is based on.
    pub base: String,
    pub branch: String,
    pub pr_url: String,
}

pub struct HistoryBridge<'a> {
    runner: &'a dyn CommandRunner,
    ctx: &'a OpsContext,
}

impl<'a> HistoryBridge<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ctx: &'a OpsContext) -> Self {
        Self { runner, ctx }
    }

    fn probe(&self) -> StateProbe<'a> {
        StateProbe::new(self.runner, self.ctx.root())
    }

    fn git(&self) -> ToolCommand {
        self.ctx.command("git")
    }

    /// Merge the current upstream subtree history into the local checkout.
    pub fn pull(&self) -> Result<PullOutcome, SyncError> {
        let _proxy = self.start_proxy()?;
        let sync = &self.ctx.config.sync;
        let root = self.ctx.root();
        let probe = self.probe();

        if !probe.worktree_clean(root)? {
            return Err(SyncError::DirtyWorkingTree);
        }
        let pre_head = probe.git_rev(root, "HEAD")?;

        let snapshot = probe.remote_head(&sync.upstream_url)?;
        println!("Fetching upstream {snapshot} through the history proxy...");
        self.runner.run(
            &self
                .git()
                .args(["fetch", sync.pull_url(&snapshot).as_str(), sync.upstream_branch.as_str()]),
        )?;
        let fetched = probe.git_rev(root, "FETCH_HEAD")?;

        let after = probe.remote_head(&sync.upstream_url)?;
        if after != snapshot {
            warn!(before = %snapshot, after = %after, "upstream moved during pull");
            return Err(SyncError::Race {
                before: snapshot,
                after,
            });
        }

        println!("{PREPARE_MESSAGE}");
        VersionPin::new(snapshot.as_str()).write(&self.ctx.pin_path())?;
        self.runner.run(&self.git().args([
            "commit",
            crate::pin::PIN_FILE_NAME,
            "--no-verify",
            "-m",
            PREPARE_MESSAGE,
        ]))?;
        let prepared = probe.git_rev(root, "HEAD")?;

        self.runner
            .run(&self.git().args([
                "merge",
                "FETCH_HEAD",
                "--no-verify",
                "--no-ff",
                "-m",
                MERGE_MESSAGE,
            ]))
            .map_err(SyncError::MergeFailed)?;

        if probe.git_rev(root, "HEAD")? == prepared {
            info!(commit = %snapshot, "nothing to merge, dropping preparation commit");
            self.runner
                .run(&self.git().args(["reset", "--hard", pre_head.as_str()]))?;
            println!("No changes to merge from upstream.");
            return Ok(PullOutcome::UpToDate { commit: snapshot });
        }

        // Fold the pin update into the merge so the sync is a single commit.
        let tree = probe.git_rev(root, "HEAD^{tree}")?;
        let folded = self.runner.read(&self.git().args([
            "commit-tree",
            tree.as_str(),
            "-p",
            pre_head.as_str(),
            "-p",
            fetched.as_str(),
            "-m",
            MERGE_MESSAGE,
        ]))?;
        self.runner
            .run(&self.git().args(["reset", "--soft", folded.as_str()]))?;

        println!("Merged upstream {snapshot}.");
        Ok(PullOutcome::Merged { commit: snapshot })
    }

    /// Publish the local history as `branch` on `user`'s fork.
    pub fn push(&self, user: &str, branch: &str) -> Result<PushOutcome, SyncError> {
        let sync = &self.ctx.config.sync;
        let root = self.ctx.root();
        let probe = self.probe();

        let pin = VersionPin::read(&self.ctx.pin_path())?;
        let base = pin.commit();
        let fork = sync.fork_url(user);

        println!("Preparing {user}/rust (base: {base})...");
        if probe.remote_has_branch(&fork, branch)? {
            return Err(SyncError::Collision {
                user: user.to_string(),
                branch: branch.to_string(),
            });
        }

        let workdir = self.upstream_workdir();
        self.runner.run(
            &self
                .git()
                .current_dir(&workdir)
                .args(["fetch", sync.upstream_url.as_str(), base]),
        )?;
        self.runner.run(&self.git().current_dir(&workdir).args([
            "push",
            fork.as_str(),
            format!("{base}:refs/heads/{branch}").as_str(),
            "-f",
        ]))?;

        let _proxy = self.start_proxy()?;
        let bridge = sync.push_url(user);
        println!("Pushing changes...");
        self.runner.run(
            &self
                .git()
                .args(["push", bridge.as_str(), format!("HEAD:{branch}").as_str()]),
        )?;

        self.runner
            .run(&self.git().args(["fetch", bridge.as_str(), branch]))?;
        let head = probe.git_rev(root, "HEAD")?;
        let fetched = probe.git_rev(root, "FETCH_HEAD")?;
        if head != fetched {
            return Err(SyncError::RoundTripMismatch {
                expected: head,
                found: fetched,
            });
        }

        let pr_url = format!("{}/pull/new/{branch}", fork.trim_end_matches('/'));
        println!("Confirmed that the push round-trips back properly. Please create a rustc PR:");
        println!("    {pr_url}");
        Ok(PushOutcome {
            base: base.to_string(),
            branch: branch.to_string(),
            pr_url,
        })
    }

    /// Repository that receives the upstream history for the fork update.
    fn upstream_workdir(&self) -> PathBuf {
        match &self.ctx.env.rustc_git {
            Some(dir) => dir.clone(),
            None => {
                warn!(
                    "RUSTC_GIT is not set; fetching upstream history into the managed checkout \
                     (set it to an existing rustc clone to avoid this)"
                );
                self.ctx.root().to_path_buf()
            }
        }
    }

    fn start_proxy(&self) -> Result<Option<BridgeProxy>, SyncError> {
        let sync = &self.ctx.config.sync;
        if !sync.start_proxy {
            return Ok(None);
        }
        let program = self
            .probe()
            .require_tool(&sync.proxy_program, "install it with 'cargo install josh-proxy'")?;
        let cache = proxy_cache_dir(self.ctx.root());
        BridgeProxy::start(&program, &cache, sync.bridge_port).map(Some)
    }
}

fn proxy_cache_dir(root: &Path) -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("miri-ops"))
        .unwrap_or_else(|| root.join("target"))
        .join("josh")
}

/// A proxy process started for the duration of one sync. Stopped on drop.
#[derive(Debug)]
pub struct BridgeProxy {
    child: Child,
    program: String,
    port: u16,
}

impl BridgeProxy {
    pub fn start(program: &Path, cache: &Path, port: u16) -> Result<Self, SyncError> {
        info!(port, cache = %cache.display(), "starting history proxy");
        let program = program.display().to_string();
        let child = Command::new(&program)
            .arg("--local")
            .arg(cache)
            .args(["--remote", "https://github.com", "--no-background", "--port"])
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SyncError::ProxyStart {
                program: program.clone(),
                source,
            })?;
        let mut proxy = Self {
            child,
            program,
            port,
        };

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        for attempt in 0..PROXY_POLL_ATTEMPTS {
            std::thread::sleep(PROXY_POLL_INTERVAL);
            proxy.ensure_running()?;
            if TcpStream::connect_timeout(&addr, PROXY_POLL_INTERVAL).is_ok() {
                // The port may belong to another process if ours died meanwhile.
                proxy.ensure_running()?;
                debug!(port, attempt, "history proxy is listening");
                return Ok(proxy);
            }
        }
        Err(SyncError::ProxyTimeout { port })
    }

    fn ensure_running(&mut self) -> Result<(), SyncError> {
        match self.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(SyncError::ProxyExited {
                port: self.port,
                status: status.to_string(),
            }),
            Err(source) => Err(SyncError::ProxyStart {
                program: self.program.clone(),
                source,
            }),
        }
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// SIGINT first so the proxy can flush its cache, then kill.
    fn stop(&mut self) {
        if self.has_exited() {
            return;
        }
        debug!(port = self.port, "stopping history proxy");
        if send_interrupt(self.child.id()) {
            for _ in 0..PROXY_STOP_ATTEMPTS {
                std::thread::sleep(PROXY_POLL_INTERVAL);
                if self.has_exited() {
                    return;
                }
            }
            warn!(port = self.port, "history proxy ignored SIGINT, killing it");
        }
        if let Err(err) = self.child.kill() {
            warn!(error = %err, "failed to stop history proxy");
        }
        let _ = self.child.wait();
    }
}

impl Drop for BridgeProxy {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_interrupt(pid: u32) -> bool {
    match Command::new("kill")
        .arg("-INT")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(err) => {
            debug!(pid, error = %err, "failed to send SIGINT");
            false
        }
    }
}
