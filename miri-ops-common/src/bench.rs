//! Interpreter benchmarks.
//!
//! Each directory under the bench directory is a small cargo project that is
//! run under `cargo miri run`, timed by hyperfine. Benchmarks run one after
//! another; results can be saved as a JSON baseline and compared later.

use crate::context::OpsContext;
use crate::probe::{ProbeError, StateProbe};
use crate::process::{CommandRunner, ProcessError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const HYPERFINE: &str = "hyperfine";

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Tool(#[from] ProcessError),

    #[error("No benchmarks found in {dir}")]
    NoBenchmarks { dir: PathBuf },

    #[error("Unknown benchmark '{name}' (available: {})", .available.join(", "))]
    UnknownBenchmark { name: String, available: Vec<String> },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid benchmark report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where to save and/or load a baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineOptions {
    pub save: Option<PathBuf>,
    pub load: Option<PathBuf>,
}

impl BaselineOptions {
    fn wants_results(&self) -> bool {
        self.save.is_some() || self.load.is_some()
    }
}

/// Timing of one benchmark, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    pub name: String,
    pub mean: f64,
    #[serde(default)]
    pub stddev: Option<f64>,
    pub min: f64,
    pub max: f64,
}

/// A saved set of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchBaseline {
    pub created_at: DateTime<Utc>,
    pub toolchain: String,
    pub results: Vec<BenchResult>,
}

impl BenchBaseline {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let raw = std::fs::read_to_string(path).map_err(|source| BenchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| BenchError::Report {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), BenchError> {
        let raw = serde_json::to_string_pretty(self).map_err(|source| BenchError::Report {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, raw + "\n").map_err(|source| BenchError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchComparison {
    pub name: String,
    pub baseline_mean: f64,
    pub current_mean: f64,
}

impl BenchComparison {
    /// Relative change of the mean, in percent. Positive is slower.
    pub fn change_percent(&self) -> f64 {
        if self.baseline_mean == 0.0 {
            return 0.0;
        }
        (self.current_mean - self.baseline_mean) / self.baseline_mean * 100.0
    }
}

impl std::fmt::Display for BenchComparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:.3}s -> {:.3}s ({:+.1}%)",
            self.name,
            self.baseline_mean,
            self.current_mean,
            self.change_percent()
        )
    }
}

/// Pair up current results with baseline entries of the same name.
pub fn compare(baseline: &BenchBaseline, current: &[BenchResult]) -> Vec<BenchComparison> {
    current
        .iter()
        .filter_map(|result| {
            let old = baseline.results.iter().find(|b| b.name == result.name)?;
            Some(BenchComparison {
                name: result.name.clone(),
                baseline_mean: old.mean,
                current_mean: result.mean,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchReport {
    pub ran: Vec<String>,
    pub results: Vec<BenchResult>,
    pub comparisons: Vec<BenchComparison>,
}

/// Subset of hyperfine's `--export-json` output.
#[derive(Debug, Deserialize)]
struct HyperfineExport {
    results: Vec<HyperfineResult>,
}

#[derive(Debug, Deserialize)]
struct HyperfineResult {
    mean: f64,
    stddev: Option<f64>,
    min: f64,
    max: f64,
}

fn parse_export(name: &str, path: &Path) -> Result<BenchResult, BenchError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BenchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let export: HyperfineExport =
        serde_json::from_str(&raw).map_err(|source| BenchError::Report {
            path: path.to_path_buf(),
            source,
        })?;
    let Some(first) = export.results.into_iter().next() else {
        return Err(BenchError::Report {
            path: path.to_path_buf(),
            source: serde::de::Error::custom("export has no results"),
        });
    };
    Ok(BenchResult {
        name: name.to_string(),
        mean: first.mean,
        stddev: first.stddev,
        min: first.min,
        max: first.max,
    })
}

pub struct BenchRunner<'a> {
    runner: &'a dyn CommandRunner,
    ctx: &'a OpsContext,
    toolchain: String,
}

impl<'a> BenchRunner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        ctx: &'a OpsContext,
        toolchain: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            ctx,
            toolchain: toolchain.into(),
        }
    }

    /// Benchmark names, sorted. Hidden entries and plain files are ignored.
    pub fn discover(&self) -> Result<Vec<String>, BenchError> {
        let dir = self.ctx.bench_dir();
        let entries = std::fs::read_dir(&dir).map_err(|source| BenchError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| BenchError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.path().is_dir() {
                names.push(name);
            }
        }
        names.sort();
        if names.is_empty() {
            return Err(BenchError::NoBenchmarks { dir });
        }
        Ok(names)
    }

    fn select(&self, requested: &[String]) -> Result<Vec<String>, BenchError> {
        let available = self.discover()?;
        if requested.is_empty() {
            return Ok(available);
        }
        for name in requested {
            if !available.contains(name) {
                return Err(BenchError::UnknownBenchmark {
                    name: name.clone(),
                    available,
                });
            }
        }
        Ok(requested.to_vec())
    }

    /// Run `names` (or every benchmark when empty), one at a time.
    pub fn run(
        &self,
        names: &[String],
        baseline: &BaselineOptions,
    ) -> Result<BenchReport, BenchError> {
        let selected = self.select(names)?;
        StateProbe::new(self.runner, self.ctx.root())
            .require_tool(HYPERFINE, "install it with 'cargo install hyperfine'")?;

        let previous = baseline.load.as_deref().map(BenchBaseline::load).transpose()?;
        let export_dir = if baseline.wants_results() {
            Some(tempfile::tempdir().map_err(|source| BenchError::Io {
                path: std::env::temp_dir(),
                source,
            })?)
        } else {
            None
        };

        let bench = &self.ctx.config.bench;
        let mut report = BenchReport::default();
        for name in &selected {
            info!(benchmark = %name, "running benchmark");
            let manifest = self.ctx.bench_dir().join(name).join("Cargo.toml");
            let target = format!(
                "cargo +{} miri run --manifest-path {}",
                self.toolchain,
                manifest.display()
            );

            let mut cmd = self
                .ctx
                .command(HYPERFINE)
                .arg("-w")
                .arg(bench.warmup.to_string())
                .arg("-m")
                .arg(bench.min_runs.to_string())
                .arg("--shell=none");
            let export = export_dir
                .as_ref()
                .map(|dir| dir.path().join(format!("{name}.json")));
            if let Some(path) = &export {
                cmd = cmd.arg("--export-json").arg_path(path);
            }
            self.runner.run(&cmd.arg(target))?;

            if let Some(path) = &export {
                let result = parse_export(name, path)?;
                debug!(benchmark = %name, mean = result.mean, "benchmark finished");
                report.results.push(result);
            }
            report.ran.push(name.clone());
        }

        if let Some(path) = &baseline.save {
            BenchBaseline {
                created_at: Utc::now(),
                toolchain: self.toolchain.clone(),
                results: report.results.clone(),
            }
            .save(path)?;
            println!("Saved baseline to {}", path.display());
        }

        if let Some(previous) = &previous {
            report.comparisons = compare(previous, &report.results);
            println!("Compared to baseline from {}:", previous.created_at.to_rfc3339());
            for comparison in &report.comparisons {
                println!("  {comparison}");
            }
        }

        Ok(report)
    }
}
