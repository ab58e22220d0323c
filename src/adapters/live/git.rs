//! Live git adapter using `git` CLI commands.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::ports::git::{Commit, GitError, GitRepo, RevList};

/// Live git adapter that shells out to the `git` CLI.
#[derive(Debug, Clone, Default)]
pub struct LiveGitRepo {
    dir: Option<PathBuf>,
}

impl LiveGitRepo {
    /// Runs git in the current working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs git in `dir`.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    fn output(&self, args: &[&str]) -> Result<Output, GitError> {
        let mut command = Command::new("git");
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        command.args(args).output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => GitError::NotInstalled,
            _ => GitError::Io(e),
        })
    }

    /// Runs a command that must succeed and returns its raw stdout.
    fn run_raw(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not a git repository") {
                return Err(GitError::NotARepository);
            }
            return Err(GitError::Command { command: format!("git {}", args.join(" ")), stderr });
        }
        Ok(output.stdout)
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        Ok(String::from_utf8_lossy(&self.run_raw(args)?).trim().to_string())
    }

    fn lines(&self, args: &[&str]) -> Result<Vec<String>, GitError> {
        Ok(self.run(args)?.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }

    /// Runs a command whose exit status is the answer.
    fn succeeds(&self, args: &[&str]) -> Result<bool, GitError> {
        Ok(self.output(args)?.status.success())
    }
}

impl GitRepo for LiveGitRepo {
    fn head_commit(&self) -> Result<Commit, GitError> {
        let raw = self.run(&["log", "-n", "1", "--format=%H%x00%ct%x00%ce%x00%cn"])?;
        let mut fields = raw.split('\0');
        let mut next = || fields.next().unwrap_or_default().to_string();
        let hash = next();
        let committed_at = next().parse().map_err(|_| GitError::Command {
            command: "git log -n 1".into(),
            stderr: format!("unexpected output: {raw}"),
        })?;
        Ok(Commit { hash, committed_at, committer_email: next(), committer_name: next() })
    }

    fn current_branch(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn commit_exists(&self, hash: &str) -> Result<bool, GitError> {
        self.succeeds(&["cat-file", "-e", &format!("{hash}^{{commit}}")])
    }

    fn rev_list(&self, query: &RevList) -> Result<Vec<String>, GitError> {
        let mut args: Vec<String> = vec!["rev-list".into()];
        if let Some(limit) = query.limit {
            args.push(format!("--max-count={limit}"));
        }
        if let Some(since) = query.since {
            args.push(format!("--max-age={since}"));
        }
        args.extend(query.heads.iter().cloned());
        if !query.exclude.is_empty() {
            args.push("--not".into());
            args.extend(query.exclude.iter().cloned());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.lines(&args)
    }

    fn merge_base(&self, head: &str, base: &str) -> Result<Option<String>, GitError> {
        let output = self.output(&["merge-base", "--all", head, base])?;
        if !output.status.success() {
            // Exit status 1 with no output means there is no common ancestor.
            if output.status.code() == Some(1) && output.stderr.is_empty() {
                return Ok(None);
            }
            return Err(GitError::Command {
                command: format!("git merge-base --all {head} {base}"),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let candidates: Vec<String> =
            String::from_utf8_lossy(&output.stdout).lines().map(String::from).collect();
        if candidates.len() <= 1 {
            return Ok(candidates.into_iter().next());
        }

        let refs = format!("--refs={base}");
        let mut args = vec!["name-rev", "--name-only", refs.as_str()];
        args.extend(candidates.iter().map(String::as_str));
        let names = self.lines(&args)?;
        let preferred = names.iter().position(|name| name == base).unwrap_or(0);
        tracing::debug!(candidates = candidates.len(), %base, "multiple merge bases");
        Ok(candidates.into_iter().nth(preferred))
    }

    fn is_clean(&self) -> Result<bool, GitError> {
        Ok(self.run(&["status", "--porcelain"])?.is_empty())
    }

    fn is_in_sync(&self) -> Result<Option<bool>, GitError> {
        if !self.succeeds(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{upstream}"])? {
            return Ok(None);
        }
        let counts = self.run(&["rev-list", "--left-right", "--count", "HEAD...@{upstream}"])?;
        Ok(Some(counts.split_whitespace().all(|n| n == "0")))
    }

    fn changed_files(&self, base: &str, head: Option<&str>) -> Result<Vec<String>, GitError> {
        let mut args = vec!["-c", "core.quotePath=false", "diff", "--name-only", base];
        args.extend(head);
        self.lines(&args)
    }

    fn checkout_file(&self, reference: &str, path: &str, dest: &Path) -> Result<(), GitError> {
        let content = self.run_raw(&["show", &format!("{reference}:{path}")])?;
        std::fs::write(dest, content)?;
        Ok(())
    }

    fn repository_root(&self) -> Result<PathBuf, GitError> {
        self.run(&["rev-parse", "--show-toplevel"]).map(PathBuf::from)
    }

    fn list_files(&self) -> Result<Vec<String>, GitError> {
        let root = self.repository_root()?;
        let repo = Self::in_dir(root);
        repo.lines(&["-c", "core.quotePath=false", "ls-files"])
    }
}
