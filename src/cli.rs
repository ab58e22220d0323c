//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI parser for `snapimpact`.
#[derive(Debug, Parser)]
#[command(
    name = "snapimpact",
    version,
    about = "Work out which stories a change can affect since the last verified build"
)]
pub struct Cli {
    /// Configuration file (defaults to `snapimpact.yaml` in the repository root).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Serve git and build index answers from a recorded cassette.
    #[arg(long, global = true, value_name = "CASSETTE")]
    pub replay: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the covering set of parent commits with builds.
    Baseline,
    /// Trace a module graph from changed files and dependencies.
    Trace {
        /// Module graph emitted by the build.
        #[arg(long)]
        stats: PathBuf,
        /// Changed file, relative to the repository root.
        #[arg(long = "changed", value_name = "PATH")]
        changed: Vec<String>,
        /// Changed package name.
        #[arg(long = "dependency", value_name = "NAME")]
        dependencies: Vec<String>,
    },
    /// Diff locked dependencies between HEAD and ancestor commits.
    Deps {
        /// Ancestor commit to compare against.
        #[arg(long = "commit", value_name = "SHA", required = true)]
        commits: Vec<String>,
        /// Changed package metadata file; detected from git when omitted.
        #[arg(long = "changed", value_name = "PATH")]
        changed: Vec<String>,
    },
    /// Run the full impact analysis and print the report as JSON.
    Impact {
        /// Module graph emitted by the build; overrides `stats_file`.
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Print commit, branch and working tree state.
    GitInfo {
        /// Branch to compute the merge base against.
        #[arg(long)]
        base_branch: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn parses_baseline_subcommand() {
        let cli = Cli::parse_from(["snapimpact", "baseline"]);
        assert!(matches!(cli.command, Command::Baseline));
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_repeated_trace_inputs() {
        let cli = Cli::parse_from([
            "snapimpact",
            "trace",
            "--stats",
            "preview-stats.json",
            "--changed",
            "src/a.ts",
            "--changed",
            "src/b.ts",
            "--dependency",
            "react",
            "-v",
        ]);
        assert!(cli.verbose);
        let Command::Trace { stats, changed, dependencies } = cli.command else {
            panic!("expected trace");
        };
        assert_eq!(stats.to_str(), Some("preview-stats.json"));
        assert_eq!(changed, vec!["src/a.ts", "src/b.ts"]);
        assert_eq!(dependencies, vec!["react"]);
    }

    #[test]
    fn deps_requires_a_commit() {
        assert!(Cli::try_parse_from(["snapimpact", "deps"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from(["snapimpact", "impact", "--replay", "run.cassette.yaml"]);
        assert!(cli.replay.is_some());
        assert!(matches!(cli.command, Command::Impact { stats: None }));
    }

    #[test]
    fn parses_git_info_with_base_branch() {
        let cli = Cli::parse_from(["snapimpact", "git-info", "--base-branch", "main"]);
        assert!(matches!(cli.command, Command::GitInfo { base_branch: Some(ref b) } if b == "main"));
    }
}
