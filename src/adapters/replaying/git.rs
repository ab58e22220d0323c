//! Replaying adapter for the `GitRepo` port.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{replay, SharedReplayer};
use crate::adapters::GIT_PORT;
use crate::ports::{Commit, GitError, GitRepo, RevList};

/// Replays recorded git operations from a cassette.
pub struct ReplayingGitRepo {
    replayer: SharedReplayer,
}

impl ReplayingGitRepo {
    /// Creates a new replaying git repo from a shared cassette replayer.
    #[must_use]
    pub fn new(replayer: SharedReplayer) -> Self {
        Self { replayer }
    }

    fn replay<T: DeserializeOwned>(&self, method: &str, input: &Value) -> Result<T, GitError> {
        replay(&self.replayer, GIT_PORT, method, input).map_err(|stderr| GitError::Command {
            command: format!("replayed git::{method}"),
            stderr,
        })
    }
}

impl GitRepo for ReplayingGitRepo {
    fn head_commit(&self) -> Result<Commit, GitError> {
        self.replay("head_commit", &json!(null))
    }

    fn current_branch(&self) -> Result<String, GitError> {
        self.replay("current_branch", &json!(null))
    }

    fn commit_exists(&self, hash: &str) -> Result<bool, GitError> {
        self.replay("commit_exists", &json!({ "hash": hash }))
    }

    fn rev_list(&self, query: &RevList) -> Result<Vec<String>, GitError> {
        self.replay("rev_list", &json!(query))
    }

    fn merge_base(&self, head: &str, base: &str) -> Result<Option<String>, GitError> {
        self.replay("merge_base", &json!({ "head": head, "base": base }))
    }

    fn is_clean(&self) -> Result<bool, GitError> {
        self.replay("is_clean", &json!(null))
    }

    fn is_in_sync(&self) -> Result<Option<bool>, GitError> {
        self.replay("is_in_sync", &json!(null))
    }

    fn changed_files(&self, base: &str, head: Option<&str>) -> Result<Vec<String>, GitError> {
        self.replay("changed_files", &json!({ "base": base, "head": head }))
    }

    fn checkout_file(&self, reference: &str, path: &str, dest: &Path) -> Result<(), GitError> {
        let content: String =
            self.replay("checkout_file", &json!({ "reference": reference, "path": path }))?;
        std::fs::write(dest, content)?;
        Ok(())
    }

    fn repository_root(&self) -> Result<PathBuf, GitError> {
        self.replay("repository_root", &json!(null))
    }

    fn list_files(&self) -> Result<Vec<String>, GitError> {
        self.replay("list_files", &json!(null))
    }
}
