//! Manifest diff resolution.
//!
//! Given the commits whose package metadata changed since a baseline, works
//! out which dependency names moved to a different locked version. Every
//! manifest/lockfile pair is compared against each relevant baseline commit
//! by building full dependency graphs on both sides, in parallel, inside
//! throwaway scratch directories.

pub mod graph;
pub mod lockfile;
pub mod package_files;
pub mod scratch;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ports::{GitError, GitRepo};
use crate::untraced::Untraced;

use self::graph::{changed_dependency_names, DependencyGraph};
use self::lockfile::{build_graph, PackageManifest, LOCKFILE_NAMES};
use self::scratch::ScratchDirs;

/// Name of a package manifest.
pub const PACKAGE_MANIFEST: &str = "package.json";

/// Default ceiling on lockfile size before a diff is skipped.
pub const DEFAULT_MAX_LOCKFILE_BYTES: u64 = 10 * 1024 * 1024;

/// Package metadata files that changed between a baseline commit and HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadataChange {
    /// Baseline commit the change is measured against.
    pub commit: String,
    /// Changed manifest and lockfile paths, repository-relative.
    pub changed_files: Vec<String>,
}

/// Returns `true` if `path` names a package manifest.
#[must_use]
pub fn is_package_manifest(path: &str) -> bool {
    file_name(path) == PACKAGE_MANIFEST
}

/// Returns `true` if `path` names a supported lockfile.
#[must_use]
pub fn is_lockfile(path: &str) -> bool {
    LOCKFILE_NAMES.contains(&file_name(path))
}

/// Returns `true` for manifests and lockfiles.
#[must_use]
pub fn is_package_metadata(path: &str) -> bool {
    is_package_manifest(path) || is_lockfile(path)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Outcome of a dependency diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyChanges {
    /// The names whose locked version differs from some baseline.
    Changed(BTreeSet<String>),
    /// The diff could not be computed; callers fall back to a coarser check.
    Unavailable(String),
}

/// Failures inside a dependency diff.
///
/// None of these escape [`ManifestDiffResolver::find_changed_dependencies`];
/// they become [`DependencyChanges::Unavailable`].
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The repository root has no manifest or no lockfile.
    #[error("no package.json and lockfile found at the repository root")]
    MissingRootFiles,
    /// A lockfile is larger than the configured ceiling.
    #[error("lockfile {path} is {size} bytes, over the {limit} byte limit")]
    LockfileTooLarge {
        /// Lockfile path.
        path: String,
        /// Actual size.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },
    /// A manifest or lockfile could not be parsed.
    #[error("could not parse {path}: {message}")]
    Parse {
        /// File path.
        path: String,
        /// Parser message.
        message: String,
    },
    /// A git command failed.
    #[error(transparent)]
    Git(#[from] GitError),
    /// A scratch file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tuning for [`ManifestDiffResolver`].
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Lockfiles larger than this are not parsed.
    pub max_lockfile_bytes: u64,
    /// Manifests and lockfiles matching these globs are skipped.
    pub untraced: Untraced,
    /// Where scratch directories are created; the system temporary
    /// directory when `None`.
    pub scratch_root: Option<PathBuf>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_lockfile_bytes: DEFAULT_MAX_LOCKFILE_BYTES,
            untraced: Untraced::none(),
            scratch_root: None,
        }
    }
}

/// One manifest/lockfile pair and the baseline commits to compare it with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PairJob {
    manifest: String,
    lockfile: String,
    importer: String,
    commits: Vec<String>,
}

impl PairJob {
    fn lockfile_name(&self) -> &str {
        file_name(&self.lockfile)
    }
}

/// Computes changed dependency names from manifest and lockfile diffs.
pub struct ManifestDiffResolver<'a> {
    git: &'a dyn GitRepo,
    options: DiffOptions,
}

impl<'a> ManifestDiffResolver<'a> {
    /// Creates a resolver over `git`.
    pub fn new(git: &'a dyn GitRepo, options: DiffOptions) -> Self {
        Self { git, options }
    }

    /// Returns the dependency names that changed between HEAD and any of the
    /// baseline commits in `changes`.
    ///
    /// Never fails: any problem is reported as
    /// [`DependencyChanges::Unavailable`], and scratch directories are
    /// removed either way.
    #[tracing::instrument(skip_all, fields(baselines = changes.len()))]
    pub fn find_changed_dependencies(&self, changes: &[PackageMetadataChange]) -> DependencyChanges {
        if changes.iter().all(|c| c.changed_files.is_empty()) {
            tracing::debug!("no package metadata changed");
            return DependencyChanges::Changed(BTreeSet::new());
        }
        match self.diff_all(changes) {
            Ok(names) => {
                tracing::info!(count = names.len(), "dependency diff complete");
                DependencyChanges::Changed(names)
            }
            Err(err) => {
                tracing::warn!(error = %err, "dependency diff unavailable");
                DependencyChanges::Unavailable(err.to_string())
            }
        }
    }

    fn diff_all(&self, changes: &[PackageMetadataChange]) -> Result<BTreeSet<String>, DiffError> {
        let root = self.git.repository_root()?;
        let jobs = self.plan_jobs(changes)?;
        if jobs.is_empty() {
            return Ok(BTreeSet::new());
        }

        let scratch = ScratchDirs::under(self.options.scratch_root.clone());
        let names = Mutex::new(BTreeSet::new());
        let result = jobs.par_iter().try_for_each(|job| self.diff_pair(&root, job, &scratch, &names));
        if let Err(err) = scratch.cleanup() {
            tracing::warn!(error = %err, "failed to remove scratch directories");
        }
        result?;
        Ok(names.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Pairs every traced manifest with its nearest lockfile, falling back
    /// to the root lockfile, and keeps the pairs some baseline touched.
    fn plan_jobs(&self, changes: &[PackageMetadataChange]) -> Result<Vec<PairJob>, DiffError> {
        let tracked: BTreeSet<String> = self.git.list_files()?.into_iter().collect();
        if !tracked.contains(PACKAGE_MANIFEST) {
            return Err(DiffError::MissingRootFiles);
        }
        let root_lockfile = LOCKFILE_NAMES
            .iter()
            .find(|name| tracked.contains(**name))
            .ok_or(DiffError::MissingRootFiles)?;

        let untraced = &self.options.untraced;
        let mut jobs = Vec::new();
        for manifest in tracked.iter().filter(|p| is_package_manifest(p)) {
            if manifest.split('/').any(|segment| segment == "node_modules") || untraced.matches(manifest) {
                continue;
            }
            let dir = parent_dir(manifest);
            let lockfile = LOCKFILE_NAMES
                .iter()
                .map(|name| join(dir, name))
                .find(|candidate| tracked.contains(candidate))
                .unwrap_or_else(|| (*root_lockfile).to_string());
            if untraced.matches(&lockfile) {
                continue;
            }

            let mut commits: Vec<String> = Vec::new();
            for change in changes {
                let touched =
                    change.changed_files.iter().any(|f| f == manifest || *f == lockfile);
                if touched && !commits.contains(&change.commit) {
                    commits.push(change.commit.clone());
                }
            }
            if commits.is_empty() {
                continue;
            }

            let importer = importer_path(dir, parent_dir(&lockfile));
            tracing::debug!(%manifest, %lockfile, %importer, commits = commits.len(), "planned diff");
            jobs.push(PairJob { manifest: manifest.clone(), lockfile, importer, commits });
        }
        Ok(jobs)
    }

    fn diff_pair(
        &self,
        root: &Path,
        job: &PairJob,
        scratch: &ScratchDirs,
        names: &Mutex<BTreeSet<String>>,
    ) -> Result<(), DiffError> {
        let lockfile_name = job.lockfile_name();
        let head_dir = scratch.create()?;
        fs::copy(root.join(&job.manifest), head_dir.join(PACKAGE_MANIFEST))?;
        fs::copy(root.join(&job.lockfile), head_dir.join(lockfile_name))?;
        let head = self.load_graph(&head_dir, job)?;

        job.commits.par_iter().try_for_each(|commit| {
            let base_dir = scratch.create()?;
            self.git.checkout_file(commit, &job.manifest, &base_dir.join(PACKAGE_MANIFEST))?;
            self.git.checkout_file(commit, &job.lockfile, &base_dir.join(lockfile_name))?;
            let base = self.load_graph(&base_dir, job)?;

            let changed = changed_dependency_names(&head, &base);
            tracing::debug!(%commit, manifest = %job.manifest, count = changed.len(), "compared graphs");
            names.lock().unwrap_or_else(PoisonError::into_inner).extend(changed);
            Ok(())
        })
    }

    fn load_graph(&self, dir: &Path, job: &PairJob) -> Result<DependencyGraph, DiffError> {
        load_graph(dir, job.lockfile_name(), &job.importer, self.options.max_lockfile_bytes)
            .map_err(|err| match err {
                DiffError::LockfileTooLarge { size, limit, .. } => {
                    DiffError::LockfileTooLarge { path: job.lockfile.clone(), size, limit }
                }
                DiffError::Parse { message, .. } => {
                    DiffError::Parse { path: job.lockfile.clone(), message }
                }
                other => other,
            })
    }
}

/// Path of the manifest directory relative to the lockfile directory.
fn importer_path(manifest_dir: &str, lockfile_dir: &str) -> String {
    if manifest_dir == lockfile_dir {
        return String::new();
    }
    if lockfile_dir.is_empty() {
        return manifest_dir.to_string();
    }
    manifest_dir
        .strip_prefix(lockfile_dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(manifest_dir)
        .to_string()
}

/// Loads `package.json` and `lockfile_name` from `dir` and builds the graph
/// for `importer`.
///
/// # Errors
///
/// Returns [`DiffError::LockfileTooLarge`] before reading an oversized
/// lockfile, and [`DiffError::Parse`] for unreadable content.
pub fn load_graph(
    dir: &Path,
    lockfile_name: &str,
    importer: &str,
    max_lockfile_bytes: u64,
) -> Result<DependencyGraph, DiffError> {
    let lock_path: PathBuf = dir.join(lockfile_name);
    let size = fs::metadata(&lock_path)?.len();
    if size > max_lockfile_bytes {
        return Err(DiffError::LockfileTooLarge {
            path: lockfile_name.to_string(),
            size,
            limit: max_lockfile_bytes,
        });
    }

    let manifest: PackageManifest = serde_json::from_str(&fs::read_to_string(dir.join(PACKAGE_MANIFEST))?)
        .map_err(|e| DiffError::Parse { path: PACKAGE_MANIFEST.to_string(), message: e.to_string() })?;
    let content = fs::read_to_string(&lock_path)?;
    let resolver = lockfile::parse(lockfile_name, &content)
        .map_err(|message| DiffError::Parse { path: lockfile_name.to_string(), message })?;
    Ok(build_graph(resolver.as_ref(), &manifest, importer))
}
