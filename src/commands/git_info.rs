//! `snapimpact git-info` command.

use serde::Serialize;

use crate::context::ServiceContext;

#[derive(Debug, Serialize)]
struct GitInfo {
    commit: String,
    committed_at: i64,
    committer_email: String,
    committer_name: String,
    branch: String,
    clean: bool,
    /// `None` when the branch has no upstream.
    in_sync: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merge_base: Option<String>,
}

/// Execute the `git-info` command.
///
/// # Errors
///
/// Returns an error string if any git query fails.
pub fn run(ctx: &ServiceContext, base_branch: Option<&str>) -> Result<(), String> {
    let git = &*ctx.git;
    let head = git.head_commit().map_err(|e| e.to_string())?;
    let merge_base = match base_branch {
        Some(base) => git.merge_base(&head.hash, base).map_err(|e| e.to_string())?,
        None => None,
    };

    super::print_json(&GitInfo {
        branch: git.current_branch().map_err(|e| e.to_string())?,
        clean: git.is_clean().map_err(|e| e.to_string())?,
        in_sync: git.is_in_sync().map_err(|e| e.to_string())?,
        commit: head.hash,
        committed_at: head.committed_at,
        committer_email: head.committer_email,
        committer_name: head.committer_name,
        merge_base,
    })
}
