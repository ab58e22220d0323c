//! Replacement lookup for builds whose commit is gone locally.

use tracing::debug;

use crate::error::ImpactError;
use crate::ports::{BuildIndex, BuildRef, GitRepo};

/// Paging budget for [`find_ancestor_build_with_commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacementSearch {
    /// Builds requested per page.
    pub page_size: usize,
    /// Total builds inspected before giving up.
    pub limit: usize,
}

impl Default for ReplacementSearch {
    fn default() -> Self {
        Self { page_size: 10, limit: 80 }
    }
}

/// Pages through the ancestor builds of build `number` until one is found
/// whose commit still resolves locally.
///
/// Running out of pages or budget yields `Ok(None)`.
///
/// # Errors
///
/// Returns an error if the build index or git fails.
pub async fn find_ancestor_build_with_commit(
    git: &dyn GitRepo,
    index: &dyn BuildIndex,
    number: u64,
    search: ReplacementSearch,
) -> Result<Option<BuildRef>, ImpactError> {
    let page_size = search.page_size.max(1);
    let mut skip = 0;

    while skip < search.limit {
        let take = page_size.min(search.limit - skip);
        let builds = index
            .ancestor_builds(number, skip, take)
            .await
            .map_err(|e| ImpactError::remote(&*e))?;

        for build in &builds {
            if !build.commit.is_empty() && git.commit_exists(&build.commit)? {
                debug!(original = number, replacement = build.number, "Found replacement build");
                return Ok(Some(build.clone()));
            }
        }
        if builds.len() < take {
            break;
        }
        skip += take;
    }

    debug!(build = number, "No ancestor build with a local commit");
    Ok(None)
}
