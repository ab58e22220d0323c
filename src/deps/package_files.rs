//! Coarse fallback when a full dependency diff is unavailable.
//!
//! Compares only the dependency-declaring fields of each changed
//! `package.json`; lockfiles are not parsed at all.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde_json::Value;

use super::scratch::ScratchDirs;
use super::{is_package_manifest, PackageMetadataChange, PACKAGE_MANIFEST};
use crate::error::ImpactError;
use crate::ports::GitRepo;

/// Manifest fields whose changes can alter installed packages.
pub const DEPENDENCY_FIELDS: [&str; 6] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
    "overrides",
    "resolutions",
];

/// Returns the changed manifests whose dependency fields differ from the
/// baseline commit that reported them.
///
/// A manifest that cannot be read or parsed on either side counts as
/// changed.
///
/// # Errors
///
/// Returns an error when the repository root or a scratch directory is
/// unavailable.
pub fn find_changed_package_files(
    git: &dyn GitRepo,
    changes: &[PackageMetadataChange],
) -> Result<Vec<String>, ImpactError> {
    let root = git.repository_root()?;
    let scratch = ScratchDirs::default();
    let mut changed = BTreeSet::new();

    for change in changes {
        for file in change.changed_files.iter().filter(|f| is_package_manifest(f)) {
            if changed.contains(file) {
                continue;
            }
            let dest = scratch.create()?.join(PACKAGE_MANIFEST);
            let base = match git.checkout_file(&change.commit, file, &dest) {
                Ok(()) => dependency_fields(&dest),
                Err(err) => {
                    tracing::debug!(%file, commit = %change.commit, error = %err, "baseline manifest unavailable");
                    None
                }
            };
            let head = dependency_fields(&root.join(file));

            let differs = match (&base, &head) {
                (Some(base), Some(head)) => base != head,
                _ => true,
            };
            if differs {
                tracing::debug!(%file, commit = %change.commit, "dependency fields changed");
                changed.insert(file.clone());
            }
        }
    }

    if let Err(err) = scratch.cleanup() {
        tracing::warn!(error = %err, "failed to remove scratch directories");
    }
    Ok(changed.into_iter().collect())
}

fn dependency_fields(path: &Path) -> Option<BTreeMap<&'static str, Value>> {
    let content = fs::read_to_string(path).ok()?;
    let Value::Object(manifest) = serde_json::from_str::<Value>(&content).ok()? else {
        return None;
    };
    Some(
        DEPENDENCY_FIELDS
            .iter()
            .filter_map(|field| manifest.get(*field).map(|value| (*field, value.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRepo;

    fn change(commit: &str, files: &[&str]) -> PackageMetadataChange {
        PackageMetadataChange {
            commit: commit.to_string(),
            changed_files: files.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn script_only_edits_are_not_dependency_changes() {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("package.json"),
            r#"{ "scripts": { "build": "vite build" }, "dependencies": { "react": "^18.0.0" } }"#,
        )
        .unwrap();
        let repo = FakeRepo::linear(&["a", "b"]).root(root.path()).file_at(
            "a",
            "package.json",
            r#"{ "scripts": { "build": "tsc" }, "dependencies": { "react": "^18.0.0" } }"#,
        );

        let files = find_changed_package_files(&repo, &[change("a", &["package.json", "yarn.lock"])]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn override_edits_are_dependency_changes() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("package.json"), r#"{ "overrides": { "semver": "7.5.4" } }"#).unwrap();
        let repo = FakeRepo::linear(&["a", "b"])
            .root(root.path())
            .file_at("a", "package.json", r"{}");

        let files = find_changed_package_files(&repo, &[change("a", &["package.json"])]).unwrap();
        assert_eq!(files, vec!["package.json"]);
    }

    #[test]
    fn unreadable_baseline_counts_as_changed() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("packages/ui")).unwrap();
        fs::write(root.path().join("packages/ui/package.json"), r"{}").unwrap();
        let repo = FakeRepo::linear(&["a", "b"]).root(root.path());

        let files =
            find_changed_package_files(&repo, &[change("a", &["packages/ui/package.json"])]).unwrap();
        assert_eq!(files, vec!["packages/ui/package.json"]);
    }
}
