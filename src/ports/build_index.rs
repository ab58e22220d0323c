//! Build index port for querying previously recorded builds.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future type alias used by [`BuildIndex`] to keep the trait dyn-compatible.
pub type IndexFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// Lifecycle state of a recorded build, as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Queued but not started.
    Pending,
    /// Still running.
    InProgress,
    /// Finished without visual changes.
    Passed,
    /// Changes were reviewed and accepted.
    Accepted,
    /// Changes were reviewed and denied.
    Denied,
    /// Component errors prevented a result.
    Broken,
    /// The build itself failed.
    Failed,
    /// The build was cancelled.
    Cancelled,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

/// A previously recorded build. Owned by the service; only ever read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    /// Opaque build identifier.
    pub id: String,
    /// Sequential build number within the project.
    pub number: u64,
    /// Commit hash the build was made from.
    pub commit: String,
    /// Reported build status.
    pub status: BuildStatus,
    /// Commit timestamp of the build, in seconds since the epoch.
    pub committed_at: i64,
    /// Whether the build was made from a developer machine.
    #[serde(default)]
    pub is_local: bool,
    /// Hash of uncommitted changes included in a local build, if any.
    #[serde(default)]
    pub uncommitted_hash: Option<String>,
}

/// Seed information about a branch, fetched once per resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHistory {
    /// Commit timestamp (seconds) of the first build ever made for the
    /// project, or `None` if it has no builds at all.
    pub first_build_committed_at: Option<i64>,
    /// Most recent build on the same branch.
    pub last_build: Option<BuildRef>,
    /// Most recent build of the head of a merged pull request whose merge
    /// produced the current commit.
    pub last_head_build: Option<BuildRef>,
}

/// Queries the remote service for recorded builds.
pub trait BuildIndex: Send + Sync {
    /// Fetches seed information for the given branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries.
    fn branch_history(&self, branch: &str) -> IndexFuture<'_, BranchHistory>;

    /// Returns the subset of `commits` that have recorded builds.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries.
    fn commits_with_builds(&self, commits: &[String]) -> IndexFuture<'_, Vec<String>>;

    /// Lists ancestor builds of build `number`, paged by `skip` and `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries.
    fn ancestor_builds(&self, number: u64, skip: usize, limit: usize)
        -> IndexFuture<'_, Vec<BuildRef>>;

    /// Lists the baseline builds for `branch` given its parent commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries.
    fn baseline_builds(
        &self,
        branch: &str,
        parent_commits: &[String],
    ) -> IndexFuture<'_, Vec<BuildRef>>;
}
