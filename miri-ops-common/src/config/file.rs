//! Optional `miri-ops.toml` at the managed root.
//!
//! Every key has a default, so the file only needs the values that differ.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up at the managed root.
pub const CONFIG_FILE_NAME: &str = "miri-ops.toml";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
}

impl OpsConfig {
    /// Load `miri-ops.toml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self, ConfigFileError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigFileError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigFileError::Parse { path, source })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Name under which the pinned toolchain is installed and overridden.
    #[serde(default = "default_toolchain_name")]
    pub name: String,
    /// Components requested from the installer.
    #[serde(default = "default_components")]
    pub components: Vec<String>,
    /// Installer for toolchains built from an arbitrary upstream commit.
    #[serde(default = "default_installer")]
    pub installer: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            name: default_toolchain_name(),
            components: default_components(),
            installer: default_installer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Upstream repository, without trailing slash.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Upstream branch the filtered history is fetched from.
    #[serde(default = "default_upstream_branch")]
    pub upstream_branch: String,
    /// Upstream path of the managed subtree, as `owner/repo` on the forge.
    #[serde(default = "default_upstream_repo")]
    pub upstream_repo: String,
    /// Fork URL; `{user}` is replaced by the pushing user.
    #[serde(default = "default_fork_url")]
    pub fork_url: String,
    /// Port of the local history-filtering proxy.
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
    /// Filter selecting the managed subtree.
    #[serde(default = "default_bridge_filter")]
    pub bridge_filter: String,
    /// Start the proxy for the duration of a sync instead of expecting one.
    #[serde(default)]
    pub start_proxy: bool,
    #[serde(default = "default_proxy_program")]
    pub proxy_program: String,
}

impl SyncConfig {
    /// Base URL of the filtering proxy.
    pub fn bridge_base(&self) -> String {
        format!("http://localhost:{}", self.bridge_port)
    }

    /// Proxy URL for pulling the subtree as of `commit`.
    pub fn pull_url(&self, commit: &str) -> String {
        format!(
            "{}/{}.git@{}{}.git",
            self.bridge_base(),
            self.upstream_repo,
            commit,
            self.bridge_filter
        )
    }

    /// Proxy URL for pushing the subtree to `user`'s fork.
    pub fn push_url(&self, user: &str) -> String {
        let repo = self
            .upstream_repo
            .rsplit('/')
            .next()
            .unwrap_or(&self.upstream_repo);
        format!(
            "{}/{}/{}.git{}.git",
            self.bridge_base(),
            user,
            repo,
            self.bridge_filter
        )
    }

    pub fn fork_url(&self, user: &str) -> String {
        self.fork_url.replace("{user}", user)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            upstream_branch: default_upstream_branch(),
            upstream_repo: default_upstream_repo(),
            fork_url: default_fork_url(),
            bridge_port: default_bridge_port(),
            bridge_filter: default_bridge_filter(),
            start_proxy: false,
            proxy_program: default_proxy_program(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Directory (relative to the root) holding one cargo project per benchmark.
    #[serde(default = "default_bench_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_warmup")]
    pub warmup: u32,
    #[serde(default = "default_min_runs")]
    pub min_runs: u32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dir: default_bench_dir(),
            warmup: default_warmup(),
            min_runs: default_min_runs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub start: u32,
    #[serde(default = "default_seed_count")]
    pub count: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            start: 0,
            count: default_seed_count(),
        }
    }
}

fn default_toolchain_name() -> String {
    "miri".to_string()
}

fn default_components() -> Vec<String> {
    ["cargo", "rust-src", "rustc-dev", "llvm-tools", "rustfmt", "clippy"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_installer() -> String {
    "rustup-toolchain-install-master".to_string()
}

fn default_upstream_url() -> String {
    "https://github.com/rust-lang/rust".to_string()
}

fn default_upstream_branch() -> String {
    "master".to_string()
}

fn default_upstream_repo() -> String {
    "rust-lang/rust".to_string()
}

fn default_fork_url() -> String {
    "https://github.com/{user}/rust".to_string()
}

fn default_bridge_port() -> u16 {
    8000
}

fn default_bridge_filter() -> String {
    ":rev(75dd959a3a40eb5b4574f8d2e23aa6efbeb33573:prefix=src/tools/miri):/src/tools/miri"
        .to_string()
}

fn default_proxy_program() -> String {
    "josh-proxy".to_string()
}

fn default_bench_dir() -> PathBuf {
    PathBuf::from("bench-cargo-miri")
}

fn default_warmup() -> u32 {
    1
}

fn default_min_runs() -> u32 {
    5
}

fn default_seed_count() -> u32 {
    256
}
