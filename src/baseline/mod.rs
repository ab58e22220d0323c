//! Baseline commit resolution.
//!
//! Finds the smallest set of ancestor commits that already have recorded
//! builds, so that every ancestor of HEAD is either in the set, behind one
//! of its members, or known to have no build. The search walks history in
//! exponentially growing batches, asking the build index about each batch
//! before listing the next one.

pub mod replacement;

use tracing::{debug, info};

use crate::error::ImpactError;
use crate::ports::{BuildIndex, BuildRef, Commit, GitError, GitRepo, RevList};

/// Branch name reported for a detached HEAD.
pub const DETACHED_HEAD: &str = "HEAD";

/// Tuning knobs for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Number of candidate commits requested in the first step.
    pub initial_batch_size: usize,
    /// Do not seed the search with the last build on the current branch.
    pub ignore_last_build_on_branch: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { initial_batch_size: 20, ignore_last_build_on_branch: false }
    }
}

/// Resolves the covering set of parent commits for one build.
///
/// All search state lives in the value returned by [`BaselineResolver::resolve`];
/// nothing carries over between invocations.
pub struct BaselineResolver<'a> {
    git: &'a dyn GitRepo,
    index: &'a dyn BuildIndex,
    options: ResolveOptions,
}

/// Commits classified so far by the doubling search.
#[derive(Debug, Default)]
struct Classified {
    with_builds: Vec<String>,
    without_builds: Vec<String>,
}

impl<'a> BaselineResolver<'a> {
    /// Creates a resolver over the given ports.
    #[must_use]
    pub fn new(git: &'a dyn GitRepo, index: &'a dyn BuildIndex, options: ResolveOptions) -> Self {
        Self { git, index, options }
    }

    /// Computes the parent commits for a build of `head` on `branch`.
    ///
    /// The result holds the maximal descendants among ancestor commits with
    /// builds, followed by any seeded commits that no longer exist locally.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::SingleCommit`] when HEAD has no parent,
    /// [`ImpactError::Remote`] when the build index fails, and git errors
    /// from the underlying commands.
    pub async fn resolve(&self, head: &Commit, branch: &str) -> Result<Vec<String>, ImpactError> {
        ensure_history(self.git)?;

        let history =
            self.index.branch_history(branch).await.map_err(|e| ImpactError::remote(&*e))?;
        let Some(first_committed_at) = history.first_build_committed_at else {
            info!("No previous builds found for this project");
            return Ok(Vec::new());
        };

        let mut classified = Classified::default();
        let mut extra_parents = Vec::new();

        if let Some(last_build) = &history.last_build {
            if self.options.ignore_last_build_on_branch {
                debug!(branch, "Ignoring last build on branch");
            } else if branch == DETACHED_HEAD {
                debug!("Detached HEAD, not seeding with the last build on branch");
            } else if last_build.committed_at > head.committed_at {
                debug!(commit = %last_build.commit, "Last build on branch is newer than HEAD");
            } else {
                self.seed(last_build, &mut classified, &mut extra_parents)?;
            }
        }
        if let Some(head_build) = &history.last_head_build {
            self.seed(head_build, &mut classified, &mut extra_parents)?;
        }

        let mut limit = self.options.initial_batch_size.max(1);
        loop {
            let candidates = self.next_commits(limit, first_committed_at, &classified)?;
            if candidates.is_empty() {
                break;
            }

            let found = self
                .index
                .commits_with_builds(&candidates)
                .await
                .map_err(|e| ImpactError::remote(&*e))?;
            debug!(candidates = candidates.len(), with_builds = found.len(), limit, "Classified batch");

            for commit in candidates {
                if found.contains(&commit) {
                    classified.with_builds.push(commit);
                } else {
                    classified.without_builds.push(commit);
                }
            }
            limit = limit.saturating_mul(2);
        }

        let mut parents = maximally_descendent_commits(self.git, &classified.with_builds)?;
        for commit in extra_parents {
            if !parents.contains(&commit) {
                parents.push(commit);
            }
        }
        info!(count = parents.len(), "Resolved parent commits");
        Ok(parents)
    }

    /// Adds a build's commit to the search seeds, or to the blind extras when
    /// the commit is gone locally (rebase, force push).
    fn seed(
        &self,
        build: &BuildRef,
        classified: &mut Classified,
        extra_parents: &mut Vec<String>,
    ) -> Result<(), GitError> {
        if classified.with_builds.contains(&build.commit) || extra_parents.contains(&build.commit) {
            return Ok(());
        }
        if self.git.commit_exists(&build.commit)? {
            debug!(commit = %build.commit, build = build.number, "Seeding with build commit");
            classified.with_builds.push(build.commit.clone());
        } else {
            debug!(
                commit = %build.commit,
                build = build.number,
                "Build commit not found locally, appending it blindly as a parent"
            );
            extra_parents.push(build.commit.clone());
        }
        Ok(())
    }

    /// Lists up to `limit` ancestors of HEAD not covered by commits with
    /// builds and not already known to be without one.
    fn next_commits(
        &self,
        limit: usize,
        since: i64,
        classified: &Classified,
    ) -> Result<Vec<String>, GitError> {
        let query = RevList {
            heads: vec!["HEAD".to_string()],
            exclude: classified.with_builds.clone(),
            since: Some(since),
            limit: Some(limit.saturating_add(classified.without_builds.len())),
        };
        Ok(self
            .git
            .rev_list(&query)?
            .into_iter()
            .filter(|c| !classified.without_builds.contains(c))
            .take(limit)
            .collect())
    }
}

/// Fails fast when HEAD has no parent commit.
///
/// # Errors
///
/// Returns [`ImpactError::SingleCommit`] for single-commit histories.
pub fn ensure_history(git: &dyn GitRepo) -> Result<(), ImpactError> {
    let query = RevList { limit: Some(2), ..RevList::head() };
    if git.rev_list(&query)?.len() < 2 {
        return Err(ImpactError::SingleCommit);
    }
    Ok(())
}

/// Drops every commit that is an ancestor of another commit in `commits`.
///
/// Lists the history of `commits` minus the history of all their parents
/// (`<commit>^@`), which leaves exactly the maximal descendants.
///
/// # Errors
///
/// Returns an error if the listing fails.
pub fn maximally_descendent_commits(
    git: &dyn GitRepo,
    commits: &[String],
) -> Result<Vec<String>, GitError> {
    if commits.is_empty() {
        return Ok(Vec::new());
    }
    let query = RevList {
        heads: commits.to_vec(),
        exclude: commits.iter().map(|c| format!("{c}^@")).collect(),
        ..RevList::default()
    };
    git.rev_list(&query)
}
