//! Recording adapter for the `BuildIndex` port.

use std::sync::Arc;

use serde_json::json;

use super::{record_result, SharedRecorder};
use crate::adapters::INDEX_PORT;
use crate::ports::{BranchHistory, BuildIndex, BuildRef, IndexFuture};

/// Records build index interactions while delegating to an inner implementation.
pub struct RecordingBuildIndex {
    inner: Box<dyn BuildIndex>,
    recorder: SharedRecorder,
}

impl RecordingBuildIndex {
    /// Creates a new recording build index wrapping the given implementation.
    pub fn new(inner: Box<dyn BuildIndex>, recorder: SharedRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl BuildIndex for RecordingBuildIndex {
    fn branch_history(&self, branch: &str) -> IndexFuture<'_, BranchHistory> {
        let input = json!({ "branch": branch });
        let recorder = Arc::clone(&self.recorder);
        let future = self.inner.branch_history(branch);
        Box::pin(async move {
            let result = future.await;
            record_result(&recorder, INDEX_PORT, "branch_history", &input, &result);
            result
        })
    }

    fn commits_with_builds(&self, commits: &[String]) -> IndexFuture<'_, Vec<String>> {
        let input = json!({ "commits": commits });
        let recorder = Arc::clone(&self.recorder);
        let future = self.inner.commits_with_builds(commits);
        Box::pin(async move {
            let result = future.await;
            record_result(&recorder, INDEX_PORT, "commits_with_builds", &input, &result);
            result
        })
    }

    fn ancestor_builds(
        &self,
        number: u64,
        skip: usize,
        limit: usize,
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        let input = json!({ "number": number, "skip": skip, "limit": limit });
        let recorder = Arc::clone(&self.recorder);
        let future = self.inner.ancestor_builds(number, skip, limit);
        Box::pin(async move {
            let result = future.await;
            record_result(&recorder, INDEX_PORT, "ancestor_builds", &input, &result);
            result
        })
    }

    fn baseline_builds(
        &self,
        branch: &str,
        parent_commits: &[String],
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        let input = json!({ "branch": branch, "parent_commits": parent_commits });
        let recorder = Arc::clone(&self.recorder);
        let future = self.inner.baseline_builds(branch, parent_commits);
        Box::pin(async move {
            let result = future.await;
            record_result(&recorder, INDEX_PORT, "baseline_builds", &input, &result);
            result
        })
    }
}
