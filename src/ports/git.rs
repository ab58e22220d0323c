//! Git repository port for version-control queries.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Failures raised by the lowest-level git wrapper.
///
/// Only genuine command failures end up here. Conditions like "commit is
/// not in the local index" are answered with a value (`Ok(false)`, `None`).
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// The `git` binary could not be spawned.
    #[error("git is not installed or not on PATH")]
    NotInstalled,
    /// The working directory is not inside a git repository.
    #[error("not a git repository (or any of the parent directories)")]
    NotARepository,
    /// A git command exited unsuccessfully.
    #[error("`{command}` failed: {stderr}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Reading or writing a scratch file failed.
    #[error("git I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for a single commit. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash.
    pub hash: String,
    /// Committer timestamp in seconds since the epoch.
    pub committed_at: i64,
    /// Committer email address.
    pub committer_email: String,
    /// Committer display name.
    pub committer_name: String,
}

/// A `git rev-list` style ancestry query.
///
/// Lists commits reachable from `heads` that are not reachable from any
/// ref in `exclude`. Refs may use the `<commit>^@` suffix, which expands to
/// all parents of `<commit>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevList {
    /// Refs to start walking from.
    pub heads: Vec<String>,
    /// Refs whose ancestry is excluded from the result.
    pub exclude: Vec<String>,
    /// Only list commits committed at or after this timestamp (seconds).
    pub since: Option<i64>,
    /// Maximum number of commits to return.
    pub limit: Option<usize>,
}

impl RevList {
    /// Ancestors of `HEAD`, newest first.
    #[must_use]
    pub fn head() -> Self {
        Self { heads: vec!["HEAD".to_string()], ..Self::default() }
    }
}

/// Provides read access to a git repository.
///
/// Abstracting git access allows deterministic replay and testing
/// without requiring a real repository.
pub trait GitRepo: Send + Sync {
    /// Returns metadata for the current HEAD commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository has no commits or is invalid.
    fn head_commit(&self) -> Result<Commit, GitError>;

    /// Returns the current branch name, or `HEAD` when detached.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch cannot be determined.
    fn current_branch(&self) -> Result<String, GitError>;

    /// Returns `true` if the commit resolves in the local object database.
    ///
    /// # Errors
    ///
    /// Returns an error only when git itself cannot be run.
    fn commit_exists(&self, hash: &str) -> Result<bool, GitError>;

    /// Lists commit hashes matching the query, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn rev_list(&self, query: &RevList) -> Result<Vec<String>, GitError>;

    /// Computes the merge base of `head` and `base`.
    ///
    /// When several merge bases exist, prefers the one that resolves to the
    /// `base` branch name, else the first one listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails for reasons other than the
    /// refs having no common ancestor.
    fn merge_base(&self, head: &str, base: &str) -> Result<Option<String>, GitError>;

    /// Returns `true` if the working tree has no uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be read.
    fn is_clean(&self) -> Result<bool, GitError>;

    /// Returns `Some(true)` when HEAD matches its upstream, `None` when no
    /// upstream is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the comparison fails.
    fn is_in_sync(&self) -> Result<Option<bool>, GitError>;

    /// Lists repository-relative paths changed between `base` and `head`.
    ///
    /// A `head` of `None` compares against the working tree, so uncommitted
    /// changes are included.
    ///
    /// # Errors
    ///
    /// Returns an error if either ref cannot be resolved.
    fn changed_files(&self, base: &str, head: Option<&str>) -> Result<Vec<String>, GitError>;

    /// Writes the contents of `path` at `reference` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist at that ref or the
    /// destination cannot be written.
    fn checkout_file(&self, reference: &str, path: &str, dest: &Path) -> Result<(), GitError>;

    /// Returns the absolute path of the repository root.
    ///
    /// # Errors
    ///
    /// Returns an error outside of a repository.
    fn repository_root(&self) -> Result<PathBuf, GitError>;

    /// Lists all tracked files, relative to the repository root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file list cannot be retrieved.
    fn list_files(&self) -> Result<Vec<String>, GitError>;
}
