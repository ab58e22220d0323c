//! Impact analysis: baseline resolution, dependency diffing and module
//! graph tracing, sequenced for one build.

pub mod changes;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::baseline::BaselineResolver;
use crate::config::Config;
use crate::deps::package_files::find_changed_package_files;
use crate::deps::{DependencyChanges, ManifestDiffResolver, PackageMetadataChange};
use crate::error::ImpactError;
use crate::ports::{BuildIndex, GitRepo};
use crate::trace::{BailReason, ModuleGraphTracer, Stats, TraceOptions, TraceOutcome, TurboSnapContext};

use self::changes::{collect_baseline_changes, Replacement};

/// Why no impact could be computed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnavailableReason {
    /// No baseline build exists for the parent commits.
    NoBaselineBuilds,
    /// A baseline build could not be mapped to a local commit.
    ChangedFilesUnavailable,
}

/// Final verdict of an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ImpactOutcome {
    /// Only these story entry modules need re-verification.
    Affected {
        /// Module id to the files it represents.
        modules: BTreeMap<String, Vec<String>>,
    },
    /// Tracing was abandoned; run everything.
    Bailed {
        /// Why.
        bail: BailReason,
    },
    /// No comparison point; run everything.
    Unavailable {
        /// Why.
        reason: UnavailableReason,
    },
}

impl From<TraceOutcome> for ImpactOutcome {
    fn from(outcome: TraceOutcome) -> Self {
        match outcome {
            TraceOutcome::Affected(modules) => Self::Affected {
                modules: modules.into_iter().map(|(id, files)| (id.to_string(), files)).collect(),
            },
            TraceOutcome::Bailed(bail) => Self::Bailed { bail },
        }
    }
}

/// Everything an analysis found, serializable for downstream tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactReport {
    /// Identifier of this run, also attached to its log lines.
    pub run_id: String,
    /// Covering set of parent commits with builds.
    pub parent_commits: Vec<String>,
    /// Commits the changed files were computed against.
    pub baseline_commits: Vec<String>,
    /// Baseline builds that were replaced by an ancestor build.
    pub replacement_build_ids: Vec<Replacement>,
    /// Files changed since the baselines.
    pub changed_files: Vec<String>,
    /// Dependencies whose locked version changed.
    pub changed_dependency_names: Vec<String>,
    /// The verdict.
    pub outcome: ImpactOutcome,
    /// Tracer diagnostics, when tracing ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TurboSnapContext>,
}

impl ImpactReport {
    fn new(run_id: String, parent_commits: Vec<String>) -> Self {
        Self {
            run_id,
            parent_commits,
            baseline_commits: Vec::new(),
            replacement_build_ids: Vec::new(),
            changed_files: Vec::new(),
            changed_dependency_names: Vec::new(),
            outcome: ImpactOutcome::Unavailable { reason: UnavailableReason::NoBaselineBuilds },
            trace: None,
        }
    }

    fn bailed(mut self, bail: BailReason) -> Self {
        info!(?bail, "Skipping impact tracing");
        self.outcome = ImpactOutcome::Bailed { bail };
        self
    }

    fn unavailable(mut self, reason: UnavailableReason) -> Self {
        info!(?reason, "Impact unavailable");
        self.outcome = ImpactOutcome::Unavailable { reason };
        self
    }
}

/// Runs a complete impact analysis over the given ports.
pub struct ImpactAnalyzer<'a> {
    git: &'a dyn GitRepo,
    index: &'a dyn BuildIndex,
    config: &'a Config,
    working_dir: PathBuf,
}

impl<'a> ImpactAnalyzer<'a> {
    /// `working_dir` is where the build ran; relative paths resolve
    /// against it.
    pub fn new(
        git: &'a dyn GitRepo,
        index: &'a dyn BuildIndex,
        config: &'a Config,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { git, index, config, working_dir: working_dir.into() }
    }

    /// Analyzes HEAD. `stats_file` overrides the configured module graph.
    ///
    /// # Errors
    ///
    /// Returns environment, remote and contract errors. Missing baselines,
    /// missing commits, missing module graphs and untrustworthy graphs are
    /// reported in the [`ImpactReport`] instead.
    #[tracing::instrument(skip_all, fields(run_id))]
    pub async fn analyze(&self, stats_file: Option<&Path>) -> Result<ImpactReport, ImpactError> {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let head = self.git.head_commit()?;
        let branch = self.git.current_branch()?;
        info!(commit = %head.hash, %branch, "Starting impact analysis");

        let parents = BaselineResolver::new(self.git, self.index, self.config.resolve_options())
            .resolve(&head, &branch)
            .await?;
        let report = ImpactReport::new(run_id, parents);

        let builds = self
            .index
            .baseline_builds(&branch, &report.parent_commits)
            .await
            .map_err(|e| ImpactError::remote(&*e))?;
        if builds.is_empty() {
            return Ok(report.unavailable(UnavailableReason::NoBaselineBuilds));
        }

        let Some(changes) =
            collect_baseline_changes(self.git, self.index, &builds, self.config.replacement_search()).await?
        else {
            return Ok(report.unavailable(UnavailableReason::ChangedFilesUnavailable));
        };
        let mut report = ImpactReport {
            baseline_commits: changes.baseline_commits,
            replacement_build_ids: changes.replacements,
            changed_files: changes.changed_files,
            ..report
        };

        let Some(stats_path) = self.stats_path(stats_file) else {
            return Ok(report.bailed(BailReason::MissingManifest { legacy_flag: self.config.legacy_stats_flag }));
        };
        let stats = Stats::read(&stats_path)?;

        let dependencies = match self.changed_dependencies(&changes.package_changes)? {
            Ok(names) => names,
            Err(bail) => return Ok(report.bailed(bail)),
        };
        report.changed_dependency_names = dependencies.iter().cloned().collect();

        let root = self.git.repository_root()?;
        let tracer = ModuleGraphTracer::new(TraceOptions {
            root: root.to_string_lossy().into_owned(),
            base_dir: self.config.base_dir_for(&root, &self.working_dir),
            config_dir: self.config.config_dir.clone(),
            static_dirs: self.config.static_dirs.clone(),
            untraced: self.config.untraced()?,
            stats_path: stats_path.display().to_string(),
        });
        let trace = tracer.trace(&stats, &report.changed_files, &dependencies)?;

        report.outcome = trace.outcome.into();
        report.trace = Some(trace.context);
        Ok(report)
    }

    fn stats_path(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        let path = explicit.or(self.config.stats_file.as_deref())?;
        let path = self.working_dir.join(path);
        if path.is_file() {
            Some(path)
        } else {
            warn!(path = %path.display(), "Module graph not found");
            None
        }
    }

    /// Changed dependency names, or the bail reason when they cannot be
    /// trusted.
    fn changed_dependencies(
        &self,
        package_changes: &[PackageMetadataChange],
    ) -> Result<Result<BTreeSet<String>, BailReason>, ImpactError> {
        if package_changes.is_empty() {
            debug!("No package metadata changes, skipping dependency diff");
            return Ok(Ok(BTreeSet::new()));
        }

        let resolver = ManifestDiffResolver::new(self.git, self.config.diff_options()?);
        match resolver.find_changed_dependencies(package_changes) {
            DependencyChanges::Changed(names) => Ok(Ok(names)),
            DependencyChanges::Unavailable(reason) => {
                warn!(%reason, "Falling back to package file comparison");
                let files = find_changed_package_files(self.git, package_changes)?;
                if files.is_empty() {
                    Ok(Ok(BTreeSet::new()))
                } else {
                    Ok(Err(BailReason::ChangedPackageFiles { files }))
                }
            }
        }
    }
}
