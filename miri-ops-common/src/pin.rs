//! The version pin: the upstream commit the subtree was last synced against.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the pin at the managed root.
pub const PIN_FILE_NAME: &str = "rust-version";

#[derive(Debug, Error)]
pub enum PinError {
    #[error("Failed to read version pin {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write version pin {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Version pin {path} must contain exactly one commit identifier, found {content:?}")]
    Malformed { path: PathBuf, content: String },
}

impl PinError {
    /// The pin file does not exist at all.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// A single opaque upstream commit identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPin {
    commit: String,
}

impl VersionPin {
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
        }
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Read the pin stored at `path`.
    pub fn read(path: &Path) -> Result<Self, PinError> {
        let content = fs::read_to_string(path).map_err(|source| PinError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut tokens = content.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(commit), None) => Ok(Self::new(commit)),
            _ => Err(PinError::Malformed {
                path: path.to_path_buf(),
                content,
            }),
        }
    }

    /// Overwrite the pin at `path` with this commit.
    pub fn write(&self, path: &Path) -> Result<(), PinError> {
        fs::write(path, format!("{}\n", self.commit)).map_err(|source| PinError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl std::fmt::Display for VersionPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.commit)
    }
}
