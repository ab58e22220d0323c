//! Changed files per baseline build.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::baseline::replacement::{find_ancestor_build_with_commit, ReplacementSearch};
use crate::deps::{is_package_metadata, PackageMetadataChange};
use crate::error::ImpactError;
use crate::ports::{BuildIndex, BuildRef, GitRepo};

/// A baseline build swapped for an ancestor whose commit still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Build that could not be used.
    pub original_build_id: String,
    /// Build used in its place.
    pub replacement_build_id: String,
}

/// What changed between HEAD and the baseline builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineChanges {
    /// Commits actually diffed against, after replacement.
    pub baseline_commits: Vec<String>,
    /// Union of changed files across baselines, sorted.
    pub changed_files: Vec<String>,
    /// One entry per baseline commit whose package metadata changed.
    pub package_changes: Vec<PackageMetadataChange>,
    /// Builds that were replaced.
    pub replacements: Vec<Replacement>,
}

/// Collects changed files against every baseline build.
///
/// A build needs a replacement when it was a local build with uncommitted
/// changes, or when its commit no longer exists locally. Returns `Ok(None)`
/// when such a build has no usable replacement: the changed files are then
/// unknown and tracing cannot run.
///
/// # Errors
///
/// Returns an error if git or the build index fails.
pub async fn collect_baseline_changes(
    git: &dyn GitRepo,
    index: &dyn BuildIndex,
    builds: &[BuildRef],
    search: ReplacementSearch,
) -> Result<Option<BaselineChanges>, ImpactError> {
    let mut changes = BaselineChanges::default();
    let mut changed_files = BTreeSet::new();

    for build in builds {
        let uncommitted = build.is_local && build.uncommitted_hash.is_some();
        let commit = if uncommitted || !git.commit_exists(&build.commit)? {
            debug!(build = build.number, commit = %build.commit, uncommitted, "Baseline build needs a replacement");
            let Some(replacement) =
                find_ancestor_build_with_commit(git, index, build.number, search).await?
            else {
                info!(build = build.number, "No replacement build found, changed files unavailable");
                return Ok(None);
            };
            changes.replacements.push(Replacement {
                original_build_id: build.id.clone(),
                replacement_build_id: replacement.id.clone(),
            });
            replacement.commit
        } else {
            build.commit.clone()
        };

        if changes.baseline_commits.contains(&commit) {
            continue;
        }
        let files = git.changed_files(&commit, None)?;
        debug!(%commit, files = files.len(), "Collected changed files");

        let metadata: Vec<String> = files.iter().filter(|f| is_package_metadata(f)).cloned().collect();
        if !metadata.is_empty() {
            changes.package_changes.push(PackageMetadataChange { commit: commit.clone(), changed_files: metadata });
        }
        changed_files.extend(files);
        changes.baseline_commits.push(commit);
    }

    changes.changed_files = changed_files.into_iter().collect();
    Ok(Some(changes))
}
