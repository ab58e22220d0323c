//! Replaying adapter for the `BuildIndex` port.

use serde_json::json;

use super::{replay, SharedReplayer};
use crate::adapters::INDEX_PORT;
use crate::ports::{BranchHistory, BuildIndex, BuildRef, IndexFuture};

/// Serves recorded build index answers from a cassette.
pub struct ReplayingBuildIndex {
    replayer: SharedReplayer,
}

impl ReplayingBuildIndex {
    /// Creates a replaying build index from a shared cassette replayer.
    #[must_use]
    pub fn new(replayer: SharedReplayer) -> Self {
        Self { replayer }
    }
}

impl BuildIndex for ReplayingBuildIndex {
    fn branch_history(&self, branch: &str) -> IndexFuture<'_, BranchHistory> {
        let result = replay(&self.replayer, INDEX_PORT, "branch_history", &json!({ "branch": branch }));
        Box::pin(async move { result.map_err(Into::into) })
    }

    fn commits_with_builds(&self, commits: &[String]) -> IndexFuture<'_, Vec<String>> {
        let result =
            replay(&self.replayer, INDEX_PORT, "commits_with_builds", &json!({ "commits": commits }));
        Box::pin(async move { result.map_err(Into::into) })
    }

    fn ancestor_builds(
        &self,
        number: u64,
        skip: usize,
        limit: usize,
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        let input = json!({ "number": number, "skip": skip, "limit": limit });
        let result = replay(&self.replayer, INDEX_PORT, "ancestor_builds", &input);
        Box::pin(async move { result.map_err(Into::into) })
    }

    fn baseline_builds(
        &self,
        branch: &str,
        parent_commits: &[String],
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        let input = json!({ "branch": branch, "parent_commits": parent_commits });
        let result = replay(&self.replayer, INDEX_PORT, "baseline_builds", &input);
        Box::pin(async move { result.map_err(Into::into) })
    }
}
