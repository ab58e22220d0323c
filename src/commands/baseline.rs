//! `snapimpact baseline` command.

use serde::Serialize;

use crate::baseline::BaselineResolver;
use crate::config::Config;
use crate::context::ServiceContext;

#[derive(Debug, Serialize)]
struct BaselineOutput {
    commit: String,
    branch: String,
    parent_commits: Vec<String>,
}

/// Execute the `baseline` command.
///
/// Prints HEAD, the branch and the covering set of parent commits as JSON.
///
/// # Errors
///
/// Returns an error string if git or the build index fails.
pub fn run(ctx: &ServiceContext, config: &Config) -> Result<(), String> {
    let head = ctx.git.head_commit().map_err(|e| e.to_string())?;
    let branch = ctx.git.current_branch().map_err(|e| e.to_string())?;

    let resolver = BaselineResolver::new(&*ctx.git, &*ctx.index, config.resolve_options());
    let parent_commits = super::block_on(resolver.resolve(&head, &branch))?.map_err(|e| e.to_string())?;

    super::print_json(&BaselineOutput { commit: head.hash, branch, parent_commits })
}
