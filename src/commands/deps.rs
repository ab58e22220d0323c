//! `snapimpact deps` command.

use serde::Serialize;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::deps::package_files::find_changed_package_files;
use crate::deps::{is_package_metadata, DependencyChanges, ManifestDiffResolver, PackageMetadataChange};

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum DepsOutput {
    Changed {
        changed_dependency_names: Vec<String>,
    },
    Unavailable {
        reason: String,
        changed_package_files: Vec<String>,
    },
}

/// Execute the `deps` command.
///
/// Diffs the locked dependency graphs of HEAD against each of `commits`.
/// When `changed` is empty, the package metadata files changed since each
/// commit are taken from git. If the graphs cannot be diffed, the changed
/// manifests are compared field by field instead.
///
/// # Errors
///
/// Returns an error string if git fails.
pub fn run(
    ctx: &ServiceContext,
    config: &Config,
    commits: &[String],
    changed: &[String],
) -> Result<(), String> {
    let git = &*ctx.git;
    let mut changes = Vec::with_capacity(commits.len());
    for commit in commits {
        let changed_files = if changed.is_empty() {
            let files = git.changed_files(commit, None).map_err(|e| e.to_string())?;
            files.into_iter().filter(|f| is_package_metadata(f)).collect()
        } else {
            changed.to_vec()
        };
        changes.push(PackageMetadataChange { commit: commit.clone(), changed_files });
    }

    let resolver = ManifestDiffResolver::new(git, config.diff_options().map_err(|e| e.to_string())?);
    let output = match resolver.find_changed_dependencies(&changes) {
        DependencyChanges::Changed(names) => {
            DepsOutput::Changed { changed_dependency_names: names.into_iter().collect() }
        }
        DependencyChanges::Unavailable(reason) => DepsOutput::Unavailable {
            changed_package_files: find_changed_package_files(git, &changes).map_err(|e| e.to_string())?,
            reason,
        },
    };
    super::print_json(&output)
}
