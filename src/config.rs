//! Run configuration: YAML file, environment overrides, defaults.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::baseline::replacement::ReplacementSearch;
use crate::baseline::ResolveOptions;
use crate::deps::{DiffOptions, DEFAULT_MAX_LOCKFILE_BYTES};
use crate::error::ImpactError;
use crate::untraced::Untraced;

/// File name looked up in the repository root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "snapimpact.yaml";

/// Settings for one impact analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Test-framework configuration directory, relative to the build base.
    pub config_dir: String,
    /// Static asset directories, relative to the build base.
    pub static_dirs: Vec<String>,
    /// Directory the build ran in, relative to the repository root.
    /// Derived from the working directory when absent.
    pub base_dir: Option<String>,
    /// Globs for files that are never traced.
    pub untraced: Vec<String>,
    /// Path of the module graph emitted by the build.
    pub stats_file: Option<PathBuf>,
    /// Whether the build tool expects the older graph-export flag.
    pub legacy_stats_flag: bool,
    /// Lockfiles larger than this are not parsed.
    pub max_lockfile_bytes: u64,
    /// Skip seeding from the last build on the current branch.
    pub ignore_last_build_on_branch: bool,
    /// Size of the first ancestor batch; doubles every step.
    pub initial_batch_size: usize,
    /// Page size for the replacement build lookup.
    pub replacement_page_size: usize,
    /// Total ancestor builds inspected before giving up on a replacement.
    pub replacement_limit: usize,
    /// GraphQL endpoint of the build index.
    pub index_url: String,
    /// Project token sent to the build index.
    pub project_token: Option<String>,
    /// Attempts per build index request.
    pub request_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: ".storybook".to_string(),
            static_dirs: Vec::new(),
            base_dir: None,
            untraced: Vec::new(),
            stats_file: None,
            legacy_stats_flag: false,
            max_lockfile_bytes: DEFAULT_MAX_LOCKFILE_BYTES,
            ignore_last_build_on_branch: false,
            initial_batch_size: 20,
            replacement_page_size: 10,
            replacement_limit: 80,
            index_url: "https://index.snapimpact.dev/graphql".to_string(),
            project_token: None,
            request_attempts: 3,
        }
    }
}

impl Config {
    /// Loads configuration for a run.
    ///
    /// Reads `explicit` if given, otherwise `snapimpact.yaml` under
    /// `repo_root` when it exists, otherwise defaults. Environment
    /// variables (and a `.env` file) override the index settings.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::Config`] if a file cannot be read or parsed, or
    /// if a numeric setting is zero.
    pub fn load(explicit: Option<&Path>, repo_root: Option<&Path>) -> Result<Self, ImpactError> {
        let _ = dotenvy::dotenv();

        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => repo_root.map(|root| root.join(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ImpactError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ImpactError::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ImpactError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Baseline search settings.
    #[must_use]
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            initial_batch_size: self.initial_batch_size,
            ignore_last_build_on_branch: self.ignore_last_build_on_branch,
        }
    }

    /// Replacement build paging budget.
    #[must_use]
    pub fn replacement_search(&self) -> ReplacementSearch {
        ReplacementSearch { page_size: self.replacement_page_size, limit: self.replacement_limit }
    }

    /// Compiled untraced globs.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::Config`] for an invalid glob.
    pub fn untraced(&self) -> Result<Untraced, ImpactError> {
        Untraced::new(&self.untraced)
    }

    /// Manifest diff settings.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::Config`] for an invalid untraced glob.
    pub fn diff_options(&self) -> Result<DiffOptions, ImpactError> {
        Ok(DiffOptions {
            max_lockfile_bytes: self.max_lockfile_bytes,
            untraced: self.untraced()?,
            ..DiffOptions::default()
        })
    }

    /// Project directory relative to `root`: the configured `base_dir`, or
    /// `working_dir` relative to `root`, or empty.
    #[must_use]
    pub fn base_dir_for(&self, root: &Path, working_dir: &Path) -> String {
        if let Some(base_dir) = &self.base_dir {
            return base_dir.trim_start_matches("./").trim_end_matches('/').to_string();
        }
        working_dir
            .strip_prefix(root)
            .map(|relative| relative.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var("SNAPIMPACT_INDEX_URL") {
            self.index_url = url;
        }
        if let Ok(token) = env::var("SNAPIMPACT_PROJECT_TOKEN") {
            self.project_token = Some(token);
        }
    }

    fn validate(&self) -> Result<(), ImpactError> {
        if self.initial_batch_size == 0 {
            return Err(ImpactError::Config("initial_batch_size must be positive".into()));
        }
        if self.replacement_page_size == 0 {
            return Err(ImpactError::Config("replacement_page_size must be positive".into()));
        }
        if self.request_attempts == 0 {
            return Err(ImpactError::Config("request_attempts must be positive".into()));
        }
        Ok(())
    }
}
