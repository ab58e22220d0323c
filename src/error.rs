//! Error taxonomy for the resolver core.

use std::error::Error;

use crate::ports::GitError;

/// Fatal failures of an impact analysis.
///
/// Recoverable conditions (missing commits, missing module graph, oversized
/// lockfiles) never show up here; they are returned as data.
#[derive(Debug, thiserror::Error)]
pub enum ImpactError {
    /// Version control is absent or the directory is not a repository.
    #[error("{0}")]
    Environment(String),
    /// HEAD has no parent, which is what a shallow clone looks like.
    #[error(
        "found only one commit in the repository; \
         this usually means a shallow clone, fetch the full history (e.g. `fetch-depth: 0`)"
    )]
    SingleCommit,
    /// The build index could not be queried, even after retries.
    #[error("build index request failed: {0}")]
    Remote(String),
    /// The module graph has no story entry modules at all.
    #[error(
        "no story entry modules found in {stats_path}; \
         check that `{config_dir}` declares stories and the build emitted the module graph"
    )]
    NoEntryModules {
        /// Path of the module graph that was read.
        stats_path: String,
        /// Configured test-framework configuration directory.
        config_dir: String,
    },
    /// The module graph exists but cannot be read or parsed.
    #[error("could not read module graph {path}: {message}")]
    Stats {
        /// Path of the module graph.
        path: String,
        /// Underlying reason.
        message: String,
    },
    /// Any other git command failure.
    #[error(transparent)]
    Git(GitError),
    /// The configuration file is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A local file could not be read or written.
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ImpactError {
    /// Wraps a transport-level failure from the build index.
    pub fn remote(err: &(dyn Error + Send + Sync)) -> Self {
        Self::Remote(err.to_string())
    }
}

impl From<GitError> for ImpactError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::NotInstalled | GitError::NotARepository => Self::Environment(err.to_string()),
            other => Self::Git(other),
        }
    }
}
