//! In-memory port implementations for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ports::{
    BranchHistory, BuildIndex, BuildRef, BuildStatus, Commit, GitError, GitRepo, IndexFuture,
    RevList,
};

struct FakeCommit {
    parents: Vec<String>,
    committed_at: i64,
}

/// A commit DAG that answers `GitRepo` queries the way `git` would.
pub(crate) struct FakeRepo {
    commits: HashMap<String, FakeCommit>,
    order: Vec<String>,
    head: String,
    branch: String,
    root: Option<PathBuf>,
    clean: bool,
    files_at: HashMap<(String, String), String>,
    changed: HashMap<String, Vec<String>>,
    tracked: Vec<String>,
    rev_lists: Mutex<Vec<RevList>>,
}

impl FakeRepo {
    pub(crate) fn new() -> Self {
        Self {
            commits: HashMap::new(),
            order: Vec::new(),
            head: String::new(),
            branch: "main".to_string(),
            root: None,
            clean: true,
            files_at: HashMap::new(),
            changed: HashMap::new(),
            tracked: Vec::new(),
            rev_lists: Mutex::new(Vec::new()),
        }
    }

    /// Adds a commit. Timestamps default to insertion order, and HEAD moves
    /// to the newest commit.
    pub(crate) fn commit(mut self, hash: &str, parents: &[&str]) -> Self {
        let committed_at = i64::try_from(self.order.len()).unwrap_or(0) * 100 + 1_000;
        self.commits.insert(
            hash.to_string(),
            FakeCommit { parents: parents.iter().map(ToString::to_string).collect(), committed_at },
        );
        self.order.push(hash.to_string());
        self.head = hash.to_string();
        self
    }

    /// Builds a linear history `hashes[0] <- hashes[1] <- ...`.
    pub(crate) fn linear(hashes: &[&str]) -> Self {
        let mut repo = Self::new();
        let mut parent: Option<&str> = None;
        for hash in hashes {
            repo = match parent {
                Some(p) => repo.commit(hash, &[p]),
                None => repo.commit(hash, &[]),
            };
            parent = Some(hash);
        }
        repo
    }

    pub(crate) fn head(mut self, hash: &str) -> Self {
        self.head = hash.to_string();
        self
    }

    pub(crate) fn branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    pub(crate) fn dirty(mut self) -> Self {
        self.clean = false;
        self
    }

    pub(crate) fn root(mut self, root: &Path) -> Self {
        self.root = Some(root.to_path_buf());
        self
    }

    pub(crate) fn file_at(mut self, reference: &str, path: &str, content: &str) -> Self {
        self.files_at.insert((reference.to_string(), path.to_string()), content.to_string());
        self
    }

    pub(crate) fn changed_since(mut self, base: &str, files: &[&str]) -> Self {
        self.changed.insert(base.to_string(), files.iter().map(ToString::to_string).collect());
        self
    }

    pub(crate) fn tracked(mut self, files: &[&str]) -> Self {
        self.tracked = files.iter().map(ToString::to_string).collect();
        self
    }

    pub(crate) fn rev_list_calls(&self) -> Vec<RevList> {
        self.rev_lists.lock().unwrap().clone()
    }

    pub(crate) fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        ancestor != descendant && self.reachable(&[descendant.to_string()]).contains(ancestor)
    }

    fn resolve(&self, reference: &str) -> Result<Vec<String>, GitError> {
        let bad = || GitError::Command {
            command: "git rev-list".into(),
            stderr: format!("fatal: bad revision '{reference}'"),
        };
        if let Some(base) = reference.strip_suffix("^@") {
            let hash = if base == "HEAD" { self.head.as_str() } else { base };
            return self.commits.get(hash).map(|c| c.parents.clone()).ok_or_else(bad);
        }
        let hash = if reference == "HEAD" { self.head.as_str() } else { reference };
        if self.commits.contains_key(hash) {
            Ok(vec![hash.to_string()])
        } else {
            Err(bad())
        }
    }

    fn reachable(&self, starts: &[String]) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<String> = starts.iter().cloned().collect();
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&hash) {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }

    fn position(&self, hash: &str) -> usize {
        self.order.iter().position(|h| h == hash).unwrap_or(0)
    }
}

impl GitRepo for FakeRepo {
    fn head_commit(&self) -> Result<Commit, GitError> {
        let commit = self.commits.get(&self.head).ok_or(GitError::NotARepository)?;
        Ok(Commit {
            hash: self.head.clone(),
            committed_at: commit.committed_at,
            committer_email: "dev@example.com".into(),
            committer_name: "Dev".into(),
        })
    }

    fn current_branch(&self) -> Result<String, GitError> {
        Ok(self.branch.clone())
    }

    fn commit_exists(&self, hash: &str) -> Result<bool, GitError> {
        Ok(self.commits.contains_key(hash))
    }

    fn rev_list(&self, query: &RevList) -> Result<Vec<String>, GitError> {
        self.rev_lists.lock().unwrap().push(query.clone());

        let mut heads = Vec::new();
        for reference in &query.heads {
            heads.extend(self.resolve(reference)?);
        }
        let mut excluded = Vec::new();
        for reference in &query.exclude {
            excluded.extend(self.resolve(reference)?);
        }
        let excluded = self.reachable(&excluded);

        let mut result: Vec<String> = self
            .reachable(&heads)
            .into_iter()
            .filter(|hash| !excluded.contains(hash))
            .filter(|hash| query.since.is_none_or(|since| self.commits[hash].committed_at >= since))
            .collect();
        result.sort_by(|a, b| {
            self.commits[b]
                .committed_at
                .cmp(&self.commits[a].committed_at)
                .then(self.position(b).cmp(&self.position(a)))
        });
        if let Some(limit) = query.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    fn merge_base(&self, head: &str, base: &str) -> Result<Option<String>, GitError> {
        let head = self.resolve(head)?;
        let base = self.resolve(base)?;
        let from_head = self.reachable(&head);
        let common: Vec<String> =
            self.reachable(&base).into_iter().filter(|h| from_head.contains(h)).collect();
        let best = common
            .iter()
            .filter(|c| !common.iter().any(|other| self.is_ancestor(c, other)))
            .max_by_key(|c| self.position(c))
            .cloned();
        Ok(best)
    }

    fn is_clean(&self) -> Result<bool, GitError> {
        Ok(self.clean)
    }

    fn is_in_sync(&self) -> Result<Option<bool>, GitError> {
        Ok(None)
    }

    fn changed_files(&self, base: &str, _head: Option<&str>) -> Result<Vec<String>, GitError> {
        if !self.commits.contains_key(base) {
            return Err(GitError::Command {
                command: format!("git diff --name-only {base}"),
                stderr: format!("fatal: bad object {base}"),
            });
        }
        Ok(self.changed.get(base).cloned().unwrap_or_default())
    }

    fn checkout_file(&self, reference: &str, path: &str, dest: &Path) -> Result<(), GitError> {
        let content =
            self.files_at.get(&(reference.to_string(), path.to_string())).ok_or_else(|| {
                GitError::Command {
                    command: format!("git show {reference}:{path}"),
                    stderr: format!("fatal: path '{path}' does not exist in '{reference}'"),
                }
            })?;
        std::fs::write(dest, content)?;
        Ok(())
    }

    fn repository_root(&self) -> Result<PathBuf, GitError> {
        self.root.clone().ok_or(GitError::NotARepository)
    }

    fn list_files(&self) -> Result<Vec<String>, GitError> {
        Ok(self.tracked.clone())
    }
}

/// Builds a passed build for `commit`.
pub(crate) fn build(number: u64, commit: &str) -> BuildRef {
    BuildRef {
        id: format!("build-{number}"),
        number,
        commit: commit.to_string(),
        status: BuildStatus::Passed,
        committed_at: 1_000,
        is_local: false,
        uncommitted_hash: None,
    }
}

/// A scripted build index.
#[derive(Default)]
pub(crate) struct FakeIndex {
    history: BranchHistory,
    builds: Vec<BuildRef>,
    ancestors: HashMap<u64, Vec<BuildRef>>,
    batches: Mutex<Vec<Vec<String>>>,
    pages: Mutex<Vec<(u64, usize, usize)>>,
}

impl FakeIndex {
    /// An index where the project has builds (first build at t=0).
    pub(crate) fn new() -> Self {
        Self {
            history: BranchHistory { first_build_committed_at: Some(0), ..BranchHistory::default() },
            ..Self::default()
        }
    }

    pub(crate) fn without_builds() -> Self {
        Self::default()
    }

    pub(crate) fn with_build(mut self, build: BuildRef) -> Self {
        self.builds.push(build);
        self
    }

    pub(crate) fn last_build(mut self, build: BuildRef) -> Self {
        self.history.last_build = Some(build);
        self
    }

    pub(crate) fn last_head_build(mut self, build: BuildRef) -> Self {
        self.history.last_head_build = Some(build);
        self
    }

    pub(crate) fn ancestors_of(mut self, number: u64, builds: Vec<BuildRef>) -> Self {
        self.ancestors.insert(number, builds);
        self
    }

    pub(crate) fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub(crate) fn pages(&self) -> Vec<(u64, usize, usize)> {
        self.pages.lock().unwrap().clone()
    }
}

impl BuildIndex for FakeIndex {
    fn branch_history(&self, _branch: &str) -> IndexFuture<'_, BranchHistory> {
        let history = self.history.clone();
        Box::pin(async move { Ok(history) })
    }

    fn commits_with_builds(&self, commits: &[String]) -> IndexFuture<'_, Vec<String>> {
        self.batches.lock().unwrap().push(commits.to_vec());
        let found = commits
            .iter()
            .filter(|c| self.builds.iter().any(|b| &b.commit == *c))
            .cloned()
            .collect();
        Box::pin(async move { Ok(found) })
    }

    fn ancestor_builds(
        &self,
        number: u64,
        skip: usize,
        limit: usize,
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        self.pages.lock().unwrap().push((number, skip, limit));
        let page = self
            .ancestors
            .get(&number)
            .map(|all| all.iter().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default();
        Box::pin(async move { Ok(page) })
    }

    fn baseline_builds(
        &self,
        _branch: &str,
        parent_commits: &[String],
    ) -> IndexFuture<'_, Vec<BuildRef>> {
        let found = parent_commits
            .iter()
            .filter_map(|c| self.builds.iter().find(|b| &b.commit == c))
            .cloned()
            .collect();
        Box::pin(async move { Ok(found) })
    }
}
