//! Command dispatch and handlers.

pub mod baseline;
pub mod deps;
pub mod git_info;
pub mod impact;
pub mod trace;

use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::adapters::live::git::LiveGitRepo;
use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::context::ServiceContext;
use crate::ports::GitRepo;

/// Environment variable naming a cassette file to record a live run into.
pub const RECORD_ENV: &str = "SNAPIMPACT_RECORD";

/// Dispatch a parsed command line to its handler.
///
/// `--replay` serves every port from a cassette. Otherwise, when
/// `SNAPIMPACT_RECORD` is set to a file path, all port interactions of the
/// live run are recorded there.
///
/// # Errors
///
/// Returns an error string if configuration loading or the selected command
/// handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let live_git = LiveGitRepo::new();
    let repo_root = match &cli.replay {
        Some(_) => None,
        None => live_git.repository_root().ok(),
    };
    let config = Config::load(cli.config.as_deref(), repo_root.as_deref()).map_err(|e| e.to_string())?;

    let ctx = if let Some(path) = &cli.replay {
        ServiceContext::replaying(path)?
    } else if let Ok(path) = env::var(RECORD_ENV) {
        let ctx = ServiceContext::recording(Path::new(&path), &config);
        if let Ok(head) = live_git.head_commit() {
            ctx.set_recorded_commit(&head.hash);
        }
        ctx
    } else {
        ServiceContext::live(&config)
    };

    let result = dispatch_with_context(&cli.command, &ctx, &config);

    // Write the cassette even when the command failed.
    if let Some(path) = ctx.save_recording()? {
        eprintln!("Recording saved to: {}", path.display());
    }
    result
}

/// Dispatch a command with the given service context.
fn dispatch_with_context(command: &Command, ctx: &ServiceContext, config: &Config) -> Result<(), String> {
    match command {
        Command::Baseline => baseline::run(ctx, config),
        Command::Trace { stats, changed, dependencies } => {
            trace::run(ctx, config, stats, changed, dependencies)
        }
        Command::Deps { commits, changed } => deps::run(ctx, config, commits, changed),
        Command::Impact { stats } => impact::run(ctx, config, stats.as_deref()),
        Command::GitInfo { base_branch } => git_info::run(ctx, base_branch.as_deref()),
    }
}

/// Drives one future to completion on a single-threaded runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;
    Ok(runtime.block_on(future))
}

/// Pretty-prints `value` as JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}

fn working_dir() -> Result<PathBuf, String> {
    env::current_dir().map_err(|e| format!("Failed to read current directory: {e}"))
}
