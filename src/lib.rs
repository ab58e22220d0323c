//! Core library entry for the `snapimpact` CLI.
//!
//! Decides what a visual-regression build actually has to re-verify: the
//! baseline commits with recorded builds, the dependencies that changed
//! since them, and the story entry modules reachable from those changes.

pub mod adapters;
pub mod baseline;
pub mod cassette;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod deps;
pub mod error;
pub mod impact;
pub mod logging;
pub mod ports;
pub mod trace;
pub mod untraced;

#[cfg(test)]
mod testing;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// Installs the log subscriber before dispatching, so `--verbose` takes
/// effect for the whole run.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    logging::init(cli.verbose);
    commands::dispatch(&cli)
}
