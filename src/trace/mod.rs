//! Module graph tracing.
//!
//! Walks the bundler's module graph backwards from changed files and
//! changed dependencies until it reaches story entry modules ("CSF globs").
//! The graph is loaded into a flat arena indexed by position; the walk is an
//! explicit worklist, so arbitrarily deep import chains are fine.

pub mod paths;
pub mod stats;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::deps::is_package_metadata;
use crate::error::ImpactError;
use crate::untraced::Untraced;

use self::paths::{is_bundler_runtime, is_under, package_name, strip_query, PathNormalizer};
pub use self::stats::{ModuleId, Stats, StatsModule};

/// Why impact tracing was abandoned in favour of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum BailReason {
    /// Files under the test-framework configuration directory changed.
    ChangedConfigFiles {
        /// Offending files.
        files: Vec<String>,
    },
    /// Files under a static-assets directory changed.
    ChangedStaticFiles {
        /// Offending files.
        files: Vec<String>,
    },
    /// Package files changed in a way the module graph cannot account for.
    ChangedPackageFiles {
        /// Offending manifests and lockfiles.
        files: Vec<String>,
    },
    /// No module graph was available.
    MissingManifest {
        /// Whether the legacy stats flag was expected to produce it.
        legacy_flag: bool,
    },
}

/// Diagnostics accumulated over one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurboSnapContext {
    /// Changed files that were used as seeds.
    pub traced_files: BTreeSet<String>,
    /// Ids of affected story entry modules.
    pub affected_module_ids: BTreeSet<ModuleId>,
    /// Set when tracing bailed.
    pub bail_reason: Option<BailReason>,
    /// Names of every story entry module in the graph.
    pub csf_globs: BTreeSet<String>,
    /// Files skipped because they match an untraced glob.
    pub untraced_files: BTreeSet<String>,
    /// Import chains that led to an affected module, ` -> ` separated.
    pub traced_paths: BTreeSet<String>,
}

/// Result of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// Affected story entry modules and the files each one stands for.
    Affected(BTreeMap<ModuleId, Vec<String>>),
    /// Tracing cannot be trusted; run everything.
    Bailed(BailReason),
}

/// A finished trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    /// What was found.
    pub outcome: TraceOutcome,
    /// How it was found.
    pub context: TurboSnapContext,
}

impl Trace {
    fn bail(reason: BailReason, mut context: TurboSnapContext) -> Self {
        tracing::info!(?reason, "impact tracing bailed");
        context.bail_reason = Some(reason.clone());
        Self { outcome: TraceOutcome::Bailed(reason), context }
    }
}

/// Settings for [`ModuleGraphTracer`].
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Absolute repository root.
    pub root: String,
    /// Project directory relative to the repository root.
    pub base_dir: String,
    /// Test-framework configuration directory, relative to the project.
    pub config_dir: String,
    /// Static-asset directories, relative to the project.
    pub static_dirs: Vec<String>,
    /// Files that are never traced.
    pub untraced: Untraced,
    /// Where the module graph came from, for error messages.
    pub stats_path: String,
}

struct Node {
    id: ModuleId,
    name: String,
    files: Vec<String>,
    importers: Vec<String>,
}

/// The module graph as an arena plus name index.
struct ModuleTable {
    nodes: Vec<Node>,
    by_name: HashMap<String, Vec<usize>>,
    csf: Vec<bool>,
    has_vendored: bool,
}

impl ModuleTable {
    fn build(stats: &Stats, normalizer: &PathNormalizer, entry_files: &HashSet<String>) -> Self {
        let mut nodes = Vec::with_capacity(stats.modules.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut has_vendored = false;

        for module in stats.modules.iter().filter(|m| !is_bundler_runtime(&m.name)) {
            let name = normalizer.normalize(&module.name);
            let files: Vec<String> = if module.modules.is_empty() {
                vec![name.clone()]
            } else {
                module.modules.iter().map(|m| normalizer.normalize(&m.name)).collect()
            };
            let importers = module
                .reasons
                .iter()
                .filter_map(|r| r.module_name.as_deref())
                .filter(|r| !is_bundler_runtime(r))
                .map(|r| normalizer.normalize(r))
                .collect();

            let index = nodes.len();
            for key in std::iter::once(&name).chain(files.iter()) {
                has_vendored |= package_name(key).is_some();
                // Loader queries (`?raw`, `?url`) are also reachable by the bare file path.
                for key in [key.as_str(), strip_query(key)] {
                    let slot = by_name.entry(key.to_string()).or_default();
                    if !slot.contains(&index) {
                        slot.push(index);
                    }
                }
            }
            nodes.push(Node {
                id: module.id.clone().unwrap_or_else(|| ModuleId::Name(module.name.clone())),
                name,
                files,
                importers,
            });
        }

        let csf = nodes
            .iter()
            .map(|node| {
                !entry_files.contains(strip_query(&node.name))
                    && node.importers.iter().any(|r| entry_files.contains(strip_query(r)))
            })
            .collect();
        Self { nodes, by_name, csf, has_vendored }
    }

    /// Nodes named `name`, or named its query-stripped form.
    fn lookup<'t>(&'t self, name: &'t str) -> impl Iterator<Item = usize> + 't {
        let stripped = strip_query(name);
        let exact = self.by_name.get(name).map_or(&[][..], Vec::as_slice);
        let bare = if stripped == name {
            &[][..]
        } else {
            self.by_name.get(stripped).map_or(&[][..], Vec::as_slice)
        };
        exact.iter().chain(bare).copied()
    }
}

/// Traces changed files and dependencies to affected story entry modules.
pub struct ModuleGraphTracer {
    options: TraceOptions,
    normalizer: PathNormalizer,
    config_dir: String,
    static_dirs: Vec<String>,
    entry_files: HashSet<String>,
}

impl ModuleGraphTracer {
    /// Creates a tracer; all configured directories are normalized once.
    #[must_use]
    pub fn new(options: TraceOptions) -> Self {
        let normalizer = PathNormalizer::new(&options.root, &options.base_dir);
        let config_dir = normalizer.normalize_dir(&options.config_dir);
        let static_dirs = options.static_dirs.iter().map(|d| normalizer.normalize_dir(d)).collect();
        let entry_files = normalizer.entry_files(&options.config_dir).into_iter().collect();
        Self { options, normalizer, config_dir, static_dirs, entry_files }
    }

    /// Runs one trace.
    ///
    /// `changed_files` are repository-relative paths; `changed_dependencies`
    /// are package names.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::NoEntryModules`] when the graph has no story
    /// entry modules at all. Every other reason to distrust the graph is a
    /// [`TraceOutcome::Bailed`].
    #[tracing::instrument(skip_all, fields(changed = changed_files.len(), dependencies = changed_dependencies.len()))]
    pub fn trace(
        &self,
        stats: &Stats,
        changed_files: &[String],
        changed_dependencies: &BTreeSet<String>,
    ) -> Result<Trace, ImpactError> {
        let table = ModuleTable::build(stats, &self.normalizer, &self.entry_files);
        let mut context = TurboSnapContext {
            csf_globs: table
                .nodes
                .iter()
                .zip(&table.csf)
                .filter(|(_, csf)| **csf)
                .map(|(node, _)| node.name.clone())
                .collect(),
            ..TurboSnapContext::default()
        };
        if context.csf_globs.is_empty() {
            return Err(ImpactError::NoEntryModules {
                stats_path: self.options.stats_path.clone(),
                config_dir: self.options.config_dir.clone(),
            });
        }
        tracing::debug!(modules = table.nodes.len(), csf_globs = context.csf_globs.len(), "module graph loaded");

        if let Some(reason) = self.directory_bail(changed_files.iter()) {
            return Ok(Trace::bail(reason, context));
        }
        if !changed_dependencies.is_empty() && !table.has_vendored {
            let files = changed_files.iter().filter(|f| is_package_metadata(f)).cloned().collect();
            return Ok(Trace::bail(BailReason::ChangedPackageFiles { files }, context));
        }

        let seeds = self.seeds(&table, changed_files, changed_dependencies, &mut context);
        let affected = match self.walk(&table, seeds, &mut context) {
            Ok(affected) => affected,
            Err(reason) => return Ok(Trace::bail(reason, context)),
        };

        let mut output = BTreeMap::new();
        for (index, path) in affected {
            let node = &table.nodes[index];
            let mut files: Vec<String> = Vec::new();
            for file in path.iter().chain(node.files.iter()) {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            }
            context.traced_paths.insert(path.join(" -> "));
            context.affected_module_ids.insert(node.id.clone());
            output.insert(node.id.clone(), files);
        }
        tracing::info!(affected = output.len(), "impact trace complete");
        Ok(Trace { outcome: TraceOutcome::Affected(output), context })
    }

    fn directory_bail<'s>(&self, files: impl Iterator<Item = &'s String> + Clone) -> Option<BailReason> {
        let config: Vec<String> =
            files.clone().filter(|f| is_under(f, &self.config_dir)).cloned().collect();
        if !config.is_empty() {
            return Some(BailReason::ChangedConfigFiles { files: config });
        }
        let statics: Vec<String> = files
            .filter(|f| self.static_dirs.iter().any(|dir| is_under(f, dir)))
            .cloned()
            .collect();
        if !statics.is_empty() {
            return Some(BailReason::ChangedStaticFiles { files: statics });
        }
        None
    }

    fn seeds(
        &self,
        table: &ModuleTable,
        changed_files: &[String],
        changed_dependencies: &BTreeSet<String>,
        context: &mut TurboSnapContext,
    ) -> Vec<(usize, String)> {
        let untraced = &self.options.untraced;
        let mut seeds = Vec::new();

        for file in changed_files {
            if untraced.matches(file) {
                context.untraced_files.insert(file.clone());
                continue;
            }
            context.traced_files.insert(file.clone());
            seeds.extend(table.lookup(file).map(|index| (index, file.clone())));
        }

        if !changed_dependencies.is_empty() {
            for (index, node) in table.nodes.iter().enumerate() {
                let vendored = std::iter::once(&node.name)
                    .chain(node.files.iter())
                    .filter_map(|name| package_name(name).map(|pkg| (name, pkg)))
                    .find(|(_, pkg)| changed_dependencies.contains(*pkg));
                if let Some((name, _)) = vendored {
                    if untraced.matches(name) {
                        context.untraced_files.insert(name.clone());
                    } else {
                        seeds.push((index, name.clone()));
                    }
                }
            }
        }
        tracing::debug!(seeds = seeds.len(), untraced = context.untraced_files.len(), "seeded trace");
        seeds
    }

    /// Reverse reachability from `seeds`. Returns each affected story entry
    /// module with the first import chain that reached it.
    fn walk(
        &self,
        table: &ModuleTable,
        seeds: Vec<(usize, String)>,
        context: &mut TurboSnapContext,
    ) -> Result<BTreeMap<usize, Vec<String>>, BailReason> {
        let untraced = &self.options.untraced;
        let mut queued = vec![false; table.nodes.len()];
        let mut via: Vec<Option<usize>> = vec![None; table.nodes.len()];
        let mut seed_names: HashMap<usize, String> = HashMap::new();
        let mut work: Vec<usize> = Vec::new();

        for (index, name) in seeds.into_iter().rev() {
            if !std::mem::replace(&mut queued[index], true) {
                seed_names.insert(index, name);
                work.push(index);
            }
        }

        let mut affected = BTreeMap::new();
        while let Some(index) = work.pop() {
            if table.csf[index] {
                affected.insert(index, chain(table, &via, &seed_names, index));
                continue;
            }

            for importer_name in &table.nodes[index].importers {
                if self.entry_files.contains(strip_query(importer_name)) {
                    continue;
                }
                if untraced.matches(importer_name) {
                    context.untraced_files.insert(importer_name.clone());
                    continue;
                }
                if let Some(reason) = self.directory_bail(std::iter::once(importer_name)) {
                    return Err(reason);
                }
                for importer in table.lookup(importer_name) {
                    if !std::mem::replace(&mut queued[importer], true) {
                        via[importer] = Some(index);
                        work.push(importer);
                    }
                }
            }
        }
        Ok(affected)
    }
}

/// Rebuilds the import chain from a seed to `index`.
fn chain(
    table: &ModuleTable,
    via: &[Option<usize>],
    seed_names: &HashMap<usize, String>,
    index: usize,
) -> Vec<String> {
    let mut path = Vec::new();
    let mut cursor = Some(index);
    while let Some(current) = cursor {
        match (via[current], seed_names.get(&current)) {
            (None, Some(seed)) => path.push(seed.clone()),
            _ => path.push(table.nodes[current].name.clone()),
        }
        cursor = via[current];
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: u64, name: &str, reasons: &[&str]) -> StatsModule {
        StatsModule {
            id: Some(ModuleId::Number(id)),
            name: name.to_string(),
            modules: Vec::new(),
            reasons: reasons
                .iter()
                .map(|r| stats::Reason { module_name: Some((*r).to_string()) })
                .collect(),
        }
    }

    const ENTRY: &str = "./.storybook/generated-stories-entry.js";

    fn graph() -> Stats {
        Stats {
            modules: vec![
                module(1, ENTRY, &[]),
                module(2, "./src/util.stories.ts", &[ENTRY]),
                module(3, "./src/util.ts", &["./src/util.stories.ts"]),
                module(4, "./src/button.stories.tsx", &[ENTRY]),
                module(5, "./src/button.tsx", &["./src/button.stories.tsx"]),
                module(6, "./src/theme.ts", &["./src/button.tsx", "./src/util.ts"]),
                module(7, "./node_modules/clsx/dist/clsx.mjs", &["./src/button.tsx"]),
                module(8, "./.storybook/preview.ts", &[ENTRY]),
                module(9, "./src/global.css", &["./.storybook/preview.ts"]),
            ],
        }
    }

    fn tracer() -> ModuleGraphTracer {
        ModuleGraphTracer::new(TraceOptions {
            root: "/repo".into(),
            config_dir: ".storybook".into(),
            static_dirs: vec!["public".into()],
            stats_path: "storybook-static/preview-stats.json".into(),
            ..TraceOptions::default()
        })
    }

    fn files(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn deps(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn affected(trace: Trace) -> BTreeMap<ModuleId, Vec<String>> {
        match trace.outcome {
            TraceOutcome::Affected(map) => map,
            TraceOutcome::Bailed(reason) => panic!("unexpected bail: {reason:?}"),
        }
    }

    #[test]
    fn simple_trace_maps_to_the_chain() {
        let trace = tracer().trace(&graph(), &files(&["src/util.ts"]), &deps(&[])).unwrap();
        let map = affected(trace);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&ModuleId::Number(2)], vec!["src/util.ts", "src/util.stories.ts"]);
    }

    #[test]
    fn loader_queries_match_the_bare_changed_file() {
        let stats = Stats {
            modules: vec![
                module(1, ENTRY, &[]),
                module(2, "./src/icon.stories.ts", &[ENTRY]),
                module(3, "./src/icon.svg?raw", &["./src/icon.stories.ts"]),
                module(4, "./src/badge.ts", &["./src/icon.stories.ts?inline"]),
            ],
        };
        let map = affected(tracer().trace(&stats, &files(&["src/icon.svg"]), &deps(&[])).unwrap());
        assert_eq!(map[&ModuleId::Number(2)], vec!["src/icon.svg", "src/icon.stories.ts"]);

        let map = affected(tracer().trace(&stats, &files(&["src/badge.ts"]), &deps(&[])).unwrap());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&ModuleId::Number(2)]);
    }

    #[test]
    fn shared_module_reaches_every_story() {
        let trace = tracer().trace(&graph(), &files(&["src/theme.ts"]), &deps(&[])).unwrap();
        assert_eq!(trace.context.traced_paths.len(), 2);
        let ids: Vec<ModuleId> = affected(trace).into_keys().collect();
        assert_eq!(ids, vec![ModuleId::Number(2), ModuleId::Number(4)]);
    }

    #[test]
    fn changed_story_file_is_itself_affected() {
        let map = affected(tracer().trace(&graph(), &files(&["src/button.stories.tsx"]), &deps(&[])).unwrap());
        assert_eq!(map[&ModuleId::Number(4)], vec!["src/button.stories.tsx"]);
    }

    #[test]
    fn unrelated_files_affect_nothing() {
        let map = affected(tracer().trace(&graph(), &files(&["README.md"]), &deps(&[])).unwrap());
        assert!(map.is_empty());
    }

    #[test]
    fn changed_dependency_seeds_vendored_modules() {
        let map = affected(tracer().trace(&graph(), &[], &deps(&["clsx"])).unwrap());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&ModuleId::Number(4)]);
    }

    #[test]
    fn config_changes_bail() {
        let trace = tracer().trace(&graph(), &files(&[".storybook/main.ts", "src/util.ts"]), &deps(&[])).unwrap();
        assert_eq!(
            trace.outcome,
            TraceOutcome::Bailed(BailReason::ChangedConfigFiles { files: files(&[".storybook/main.ts"]) })
        );
        assert!(trace.context.bail_reason.is_some());
    }

    #[test]
    fn reaching_the_config_dir_bails() {
        let trace = tracer().trace(&graph(), &files(&["src/global.css"]), &deps(&[])).unwrap();
        assert_eq!(
            trace.outcome,
            TraceOutcome::Bailed(BailReason::ChangedConfigFiles { files: files(&[".storybook/preview.ts"]) })
        );
    }

    #[test]
    fn static_changes_bail() {
        let trace = tracer().trace(&graph(), &files(&["public/logo.svg"]), &deps(&[])).unwrap();
        assert!(matches!(trace.outcome, TraceOutcome::Bailed(BailReason::ChangedStaticFiles { .. })));
    }

    #[test]
    fn dependency_change_without_vendored_modules_bails() {
        let stats = Stats {
            modules: vec![module(1, ENTRY, &[]), module(2, "./src/a.stories.ts", &[ENTRY])],
        };
        let trace = tracer().trace(&stats, &files(&["yarn.lock"]), &deps(&["react"])).unwrap();
        assert_eq!(
            trace.outcome,
            TraceOutcome::Bailed(BailReason::ChangedPackageFiles { files: files(&["yarn.lock"]) })
        );
    }

    #[test]
    fn graph_without_stories_is_an_error() {
        let stats = Stats { modules: vec![module(1, "./src/a.ts", &[])] };
        let err = tracer().trace(&stats, &files(&["src/a.ts"]), &deps(&[])).unwrap_err();
        assert!(matches!(err, ImpactError::NoEntryModules { .. }));
    }

    #[test]
    fn untraced_files_are_recorded_and_skipped() {
        let tracer = ModuleGraphTracer::new(TraceOptions {
            untraced: Untraced::new(&["src/theme.ts".to_string()]).unwrap(),
            ..tracer().options
        });
        let trace = tracer.trace(&graph(), &files(&["src/theme.ts"]), &deps(&[])).unwrap();
        assert!(trace.context.untraced_files.contains("src/theme.ts"));
        assert!(affected(trace).is_empty());
    }

    #[test]
    fn untraced_importers_cut_the_chain() {
        let tracer = ModuleGraphTracer::new(TraceOptions {
            untraced: Untraced::new(&["src/button.tsx".to_string()]).unwrap(),
            ..tracer().options
        });
        let map = affected(tracer.trace(&graph(), &files(&["src/theme.ts"]), &deps(&[])).unwrap());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&ModuleId::Number(2)]);
    }

    #[test]
    fn aggregated_modules_are_found_by_submodule() {
        let mut story = module(2, "./src/card.stories.tsx + 1 modules", &[ENTRY]);
        story.modules = vec![
            stats::Submodule { name: "./src/card.stories.tsx".into() },
            stats::Submodule { name: "./src/card.tsx".into() },
        ];
        let stats = Stats { modules: vec![module(1, ENTRY, &[]), story] };
        let map = affected(tracer().trace(&stats, &files(&["src/card.tsx"]), &deps(&[])).unwrap());
        assert_eq!(map[&ModuleId::Number(2)], vec!["src/card.tsx", "src/card.stories.tsx"]);
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut modules = vec![module(0, ENTRY, &[]), module(1, "./src/deep.stories.ts", &[ENTRY])];
        let mut importer = "./src/deep.stories.ts".to_string();
        for i in 0..20_000_u64 {
            let name = format!("./src/m{i}.ts");
            modules.push(module(i + 2, &name, &[&importer]));
            importer = name;
        }
        let stats = Stats { modules };
        let map = affected(tracer().trace(&stats, &files(&["src/m19999.ts"]), &deps(&[])).unwrap());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn widening_changed_files_never_shrinks_the_result() {
        let tracer = tracer();
        let candidates = ["src/util.ts", "src/theme.ts", "src/button.tsx", "README.md", "src/button.stories.tsx"];
        for split in 0..candidates.len() {
            let narrow = files(&candidates[..split]);
            let wide = files(&candidates[..=split]);
            let before = affected(tracer.trace(&graph(), &narrow, &deps(&[])).unwrap());
            let after = affected(tracer.trace(&graph(), &wide, &deps(&[])).unwrap());
            for id in before.keys() {
                assert!(after.contains_key(id), "{id} dropped when adding {}", candidates[split]);
            }
        }
    }

    #[test]
    fn widening_changed_dependencies_never_shrinks_the_result() {
        let tracer = tracer();
        for changed in [files(&[]), files(&["src/util.ts"]), files(&["src/theme.ts"])] {
            let before = affected(tracer.trace(&graph(), &changed, &deps(&[])).unwrap());
            let after = affected(tracer.trace(&graph(), &changed, &deps(&["clsx"])).unwrap());
            for id in before.keys() {
                assert!(after.contains_key(id), "{id} dropped when clsx changed alongside {changed:?}");
            }
            assert!(after.contains_key(&ModuleId::Number(4)));
        }
    }

    #[test]
    fn bail_reasons_serialize_kebab_case() {
        let json = serde_json::to_value(BailReason::MissingManifest { legacy_flag: true }).unwrap();
        assert_eq!(json["reason"], "missing-manifest");
        assert_eq!(json["legacy_flag"], true);
    }
}
