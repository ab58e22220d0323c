//! `snapimpact trace` command.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::impact::ImpactOutcome;
use crate::trace::{ModuleGraphTracer, Stats, TraceOptions, TurboSnapContext};

#[derive(Debug, Serialize)]
struct TraceOutput {
    outcome: ImpactOutcome,
    trace: TurboSnapContext,
}

/// Execute the `trace` command.
///
/// Runs the module graph tracer alone over explicit inputs. Outside a
/// repository the current directory stands in for the repository root.
///
/// # Errors
///
/// Returns an error string if the module graph cannot be read or has no
/// story entry modules.
pub fn run(
    ctx: &ServiceContext,
    config: &Config,
    stats: &Path,
    changed: &[String],
    dependencies: &[String],
) -> Result<(), String> {
    let working_dir = super::working_dir()?;
    let root = ctx.git.repository_root().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "no repository root, using the current directory");
        working_dir.clone()
    });

    let stats_path = working_dir.join(stats);
    let graph = Stats::read(&stats_path).map_err(|e| e.to_string())?;
    let tracer = ModuleGraphTracer::new(TraceOptions {
        root: root.to_string_lossy().into_owned(),
        base_dir: config.base_dir_for(&root, &working_dir),
        config_dir: config.config_dir.clone(),
        static_dirs: config.static_dirs.clone(),
        untraced: config.untraced().map_err(|e| e.to_string())?,
        stats_path: stats_path.display().to_string(),
    });

    let dependencies: BTreeSet<String> = dependencies.iter().cloned().collect();
    let trace = tracer.trace(&graph, changed, &dependencies).map_err(|e| e.to_string())?;
    super::print_json(&TraceOutput { outcome: trace.outcome.into(), trace: trace.context })
}
