//! Recording adapter for the `GitRepo` port.

use std::path::{Path, PathBuf};

use serde_json::json;

use super::{record_result, SharedRecorder};
use crate::adapters::GIT_PORT;
use crate::ports::{Commit, GitError, GitRepo, RevList};

/// Records git interactions while delegating to an inner implementation.
pub struct RecordingGitRepo {
    inner: Box<dyn GitRepo>,
    recorder: SharedRecorder,
}

impl RecordingGitRepo {
    /// Creates a new recording git repo wrapping the given implementation.
    pub fn new(inner: Box<dyn GitRepo>, recorder: SharedRecorder) -> Self {
        Self { inner, recorder }
    }

    fn record<T: serde::Serialize>(
        &self,
        method: &str,
        input: &serde_json::Value,
        result: &Result<T, GitError>,
    ) {
        record_result(&self.recorder, GIT_PORT, method, input, result);
    }
}

impl GitRepo for RecordingGitRepo {
    fn head_commit(&self) -> Result<Commit, GitError> {
        let result = self.inner.head_commit();
        self.record("head_commit", &json!(null), &result);
        result
    }

    fn current_branch(&self) -> Result<String, GitError> {
        let result = self.inner.current_branch();
        self.record("current_branch", &json!(null), &result);
        result
    }

    fn commit_exists(&self, hash: &str) -> Result<bool, GitError> {
        let result = self.inner.commit_exists(hash);
        self.record("commit_exists", &json!({ "hash": hash }), &result);
        result
    }

    fn rev_list(&self, query: &RevList) -> Result<Vec<String>, GitError> {
        let result = self.inner.rev_list(query);
        self.record("rev_list", &json!(query), &result);
        result
    }

    fn merge_base(&self, head: &str, base: &str) -> Result<Option<String>, GitError> {
        let result = self.inner.merge_base(head, base);
        self.record("merge_base", &json!({ "head": head, "base": base }), &result);
        result
    }

    fn is_clean(&self) -> Result<bool, GitError> {
        let result = self.inner.is_clean();
        self.record("is_clean", &json!(null), &result);
        result
    }

    fn is_in_sync(&self) -> Result<Option<bool>, GitError> {
        let result = self.inner.is_in_sync();
        self.record("is_in_sync", &json!(null), &result);
        result
    }

    fn changed_files(&self, base: &str, head: Option<&str>) -> Result<Vec<String>, GitError> {
        let result = self.inner.changed_files(base, head);
        self.record("changed_files", &json!({ "base": base, "head": head }), &result);
        result
    }

    fn checkout_file(&self, reference: &str, path: &str, dest: &Path) -> Result<(), GitError> {
        // The cassette stores the file content so replay can recreate it.
        let result = self
            .inner
            .checkout_file(reference, path, dest)
            .and_then(|()| std::fs::read_to_string(dest).map_err(GitError::from));
        self.record("checkout_file", &json!({ "reference": reference, "path": path }), &result);
        result.map(|_| ())
    }

    fn repository_root(&self) -> Result<PathBuf, GitError> {
        let result = self.inner.repository_root();
        self.record("repository_root", &json!(null), &result);
        result
    }

    fn list_files(&self) -> Result<Vec<String>, GitError> {
        let result = self.inner.list_files();
        self.record("list_files", &json!(null), &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::adapters::replaying::{ReplayingGitRepo, SharedReplayer};
    use crate::cassette::format::Cassette;
    use crate::cassette::recorder::CassetteRecorder;
    use crate::cassette::replayer::CassetteReplayer;
    use crate::testing::FakeRepo;

    #[test]
    fn recorded_git_session_replays_identically() {
        let dir = tempfile::tempdir().unwrap();
        let cassette_path = dir.path().join("git.cassette.yaml");
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(&cassette_path, "test", "C")));

        let fake = FakeRepo::linear(&["A", "B", "C"])
            .root(dir.path())
            .changed_since("A", &["src/a.ts"])
            .file_at("A", "package.json", "{}");
        let query = RevList { exclude: vec!["A".into()], ..RevList::head() };

        // Scope the adapter so it's dropped before we try to unwrap
        let (head, listed, missing) = {
            let git = RecordingGitRepo::new(Box::new(fake), Arc::clone(&recorder));
            let head = git.head_commit().unwrap();
            let listed = git.rev_list(&query).unwrap();
            git.checkout_file("A", "package.json", &dir.path().join("recorded.json")).unwrap();
            let missing = git.changed_files("nope", None).is_err();
            (head, listed, missing)
        };
        assert!(missing);

        let recorder = Arc::try_unwrap(recorder).unwrap().into_inner().unwrap();
        recorder.finish().unwrap();

        let cassette = Cassette::load(&cassette_path).unwrap();
        let replayer: SharedReplayer = Arc::new(Mutex::new(CassetteReplayer::new(&cassette)));
        let git = ReplayingGitRepo::new(replayer);

        assert_eq!(git.head_commit().unwrap(), head);
        assert_eq!(git.rev_list(&query).unwrap(), listed);
        let dest = dir.path().join("replayed.json");
        git.checkout_file("A", "package.json", &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "{}");
        assert!(git.changed_files("nope", None).unwrap_err().to_string().contains("bad object"));
    }
}
