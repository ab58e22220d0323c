//! `snapimpact impact` command.

use std::path::Path;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::impact::ImpactAnalyzer;

/// Execute the `impact` command.
///
/// Runs the whole analysis for HEAD and prints the report as JSON.
///
/// # Errors
///
/// Returns an error string for environment, remote and module graph
/// failures. Bails and unavailable baselines are part of the report.
pub fn run(ctx: &ServiceContext, config: &Config, stats: Option<&Path>) -> Result<(), String> {
    let working_dir = super::working_dir()?;
    let analyzer = ImpactAnalyzer::new(&*ctx.git, &*ctx.index, config, working_dir);
    let report = super::block_on(analyzer.analyze(stats))?.map_err(|e| e.to_string())?;
    super::print_json(&report)
}
