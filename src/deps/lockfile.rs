//! Lockfile parsing and dependency graph construction.
//!
//! Each supported format implements [`LockfileResolver`], which answers
//! "which locked package satisfies `name@range` when required from
//! `parent`". [`build_graph`] drives any resolver from a manifest's
//! declared dependencies with an explicit worklist.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_yaml::Value;

use super::graph::DependencyGraph;

/// Lockfile names, in lookup order.
pub const LOCKFILE_NAMES: [&str; 3] = ["yarn.lock", "pnpm-lock.yaml", "package-lock.json"];

/// The dependency-bearing parts of a `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,
    /// Package version.
    #[serde(default)]
    pub version: Option<String>,
    /// Runtime dependencies.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Development dependencies.
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    /// Optional dependencies.
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Declared `(name, range)` pairs that root the dependency graph.
    ///
    /// Runtime entries win over dev and optional entries for the same name.
    #[must_use]
    pub fn declared_dependencies(&self) -> Vec<(String, String)> {
        let mut declared: BTreeMap<&str, &str> = BTreeMap::new();
        for section in [&self.optional_dependencies, &self.dev_dependencies, &self.dependencies] {
            for (name, range) in section {
                declared.insert(name, range);
            }
        }
        declared.into_iter().map(|(n, r)| (n.to_string(), r.to_string())).collect()
    }
}

/// A locked package chosen for a requested dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Identity of the locked entry; equal keys are the same package.
    pub key: String,
    /// Locked version.
    pub version: String,
    /// `(name, range)` pairs the package itself requires.
    pub dependencies: Vec<(String, String)>,
}

/// Resolves requested dependencies against one parsed lockfile.
pub trait LockfileResolver: Send + Sync {
    /// Key that dependencies of the project at `importer` are resolved from.
    fn root_key(&self, importer: &str) -> String;

    /// Dependencies that root the graph for the project at `importer`.
    fn root_dependencies(&self, manifest: &PackageManifest, _importer: &str) -> Vec<(String, String)> {
        manifest.declared_dependencies()
    }

    /// Resolves `name@range` required from the entry `parent_key`.
    fn resolve(&self, parent_key: &str, name: &str, range: &str) -> Option<Resolved>;
}

/// Parses a lockfile by its file name.
///
/// # Errors
///
/// Returns a message if the name is not a supported lockfile or the content
/// does not parse.
pub fn parse(file_name: &str, content: &str) -> Result<Box<dyn LockfileResolver>, String> {
    match file_name {
        "package-lock.json" => Ok(Box::new(NpmLockfile::parse(content)?)),
        "yarn.lock" if content.contains("__metadata:") => {
            Ok(Box::new(DescriptorLockfile::parse_berry(content)?))
        }
        "yarn.lock" => Ok(Box::new(DescriptorLockfile::parse_classic(content)?)),
        "pnpm-lock.yaml" => Ok(Box::new(PnpmLockfile::parse(content)?)),
        other => Err(format!("unsupported lockfile `{other}`")),
    }
}

/// Builds the dependency graph of `manifest` as locked by `lockfile`.
///
/// Dependencies missing from the lockfile become leaf nodes versioned
/// `missing:<range>`, so adding one to a manifest without relocking still
/// shows up as a change.
#[must_use]
pub fn build_graph(
    lockfile: &dyn LockfileResolver,
    manifest: &PackageManifest,
    importer: &str,
) -> DependencyGraph {
    let mut graph = DependencyGraph::new(
        manifest.name.clone().unwrap_or_else(|| "root".to_string()),
        manifest.version.clone().unwrap_or_default(),
    );
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let root_key = lockfile.root_key(importer);

    let mut work: Vec<(usize, String, String, String)> = lockfile
        .root_dependencies(manifest, importer)
        .into_iter()
        .map(|(name, range)| (graph.root(), root_key.clone(), name, range))
        .collect();

    while let Some((parent, parent_key, name, range)) = work.pop() {
        let resolved = lockfile.resolve(&parent_key, &name, &range).unwrap_or_else(|| Resolved {
            key: format!("missing:{name}@{range}"),
            version: format!("missing:{range}"),
            dependencies: Vec::new(),
        });

        if let Some(&index) = by_key.get(&resolved.key) {
            graph.add_edge(parent, index);
            continue;
        }
        let index = graph.add_node(name, resolved.version);
        by_key.insert(resolved.key.clone(), index);
        graph.add_edge(parent, index);
        for (dependency, range) in resolved.dependencies {
            work.push((index, resolved.key.clone(), dependency, range));
        }
    }
    graph
}

/// Splits `name@range` into its name, honouring a leading scope `@`.
fn descriptor_name(descriptor: &str) -> &str {
    descriptor
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '@')
        .map_or(descriptor, |(i, _)| &descriptor[..i])
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Mapping(map)) = value else {
        return Vec::new();
    };
    map.iter().filter_map(|(k, v)| Some((scalar(k)?, scalar(v)?))).collect()
}

// --- npm ---

#[derive(Deserialize)]
struct NpmLockJson {
    #[serde(default)]
    packages: Option<BTreeMap<String, NpmPackageEntry>>,
    #[serde(default)]
    dependencies: Option<BTreeMap<String, NpmLegacyEntry>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct NpmPackageEntry {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    link: bool,
    #[serde(default)]
    resolved: Option<String>,
}

#[derive(Deserialize)]
struct NpmLegacyEntry {
    #[serde(default)]
    version: String,
    #[serde(default)]
    requires: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: BTreeMap<String, NpmLegacyEntry>,
}

struct NpmNode {
    version: String,
    dependencies: Vec<(String, String)>,
    link_target: Option<String>,
}

/// `package-lock.json`, keyed by install path (`node_modules/a/node_modules/b`).
///
/// Version 1 files are converted into the same path layout.
struct NpmLockfile {
    nodes: HashMap<String, NpmNode>,
}

impl NpmLockfile {
    fn parse(content: &str) -> Result<Self, String> {
        let lock: NpmLockJson = serde_json::from_str(content)
            .map_err(|e| format!("invalid package-lock.json: {e}"))?;
        let mut nodes = HashMap::new();

        if let Some(packages) = lock.packages {
            for (path, entry) in packages {
                let mut dependencies: Vec<(String, String)> = entry.dependencies.into_iter().collect();
                dependencies.extend(entry.optional_dependencies);
                let link_target = entry.link.then_some(entry.resolved).flatten();
                nodes.insert(
                    path,
                    NpmNode { version: entry.version.unwrap_or_default(), dependencies, link_target },
                );
            }
        } else if let Some(dependencies) = lock.dependencies {
            let mut stack: Vec<(String, BTreeMap<String, NpmLegacyEntry>)> =
                vec![(String::new(), dependencies)];
            while let Some((prefix, entries)) = stack.pop() {
                for (name, entry) in entries {
                    let path = install_path(&prefix, &name);
                    nodes.insert(
                        path.clone(),
                        NpmNode {
                            version: entry.version,
                            dependencies: entry.requires.into_iter().collect(),
                            link_target: None,
                        },
                    );
                    if !entry.dependencies.is_empty() {
                        stack.push((path, entry.dependencies));
                    }
                }
            }
        }
        Ok(Self { nodes })
    }

    /// Walks up from `parent` the way node's module resolution does.
    fn find(&self, parent: &str, name: &str) -> Option<String> {
        let mut scope = parent.to_string();
        loop {
            let candidate = install_path(&scope, name);
            if self.nodes.contains_key(&candidate) {
                return Some(candidate);
            }
            if scope.is_empty() {
                return None;
            }
            scope = match scope.rfind("node_modules/") {
                Some(i) => scope[..i].trim_end_matches('/').to_string(),
                None => String::new(),
            };
        }
    }
}

fn install_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        format!("node_modules/{name}")
    } else {
        format!("{prefix}/node_modules/{name}")
    }
}

impl LockfileResolver for NpmLockfile {
    fn root_key(&self, importer: &str) -> String {
        importer.to_string()
    }

    fn resolve(&self, parent_key: &str, name: &str, _range: &str) -> Option<Resolved> {
        let mut key = self.find(parent_key, name)?;
        let mut node = self.nodes.get(&key)?;
        if let Some(target) = &node.link_target {
            if let Some(linked) = self.nodes.get(target) {
                key.clone_from(target);
                node = linked;
            }
        }
        Some(Resolved {
            key,
            version: node.version.clone(),
            dependencies: node.dependencies.clone(),
        })
    }
}

// --- yarn ---

#[derive(Debug, Default, Clone)]
struct LockedPackage {
    version: String,
    dependencies: Vec<(String, String)>,
}

/// `yarn.lock` (classic or berry): entries keyed by `name@range` descriptors.
#[derive(Default)]
struct DescriptorLockfile {
    by_descriptor: HashMap<String, usize>,
    packages: Vec<LockedPackage>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ClassicSection {
    Dependencies,
    Other,
}

impl DescriptorLockfile {
    fn insert(&mut self, descriptors: &str, package: LockedPackage) {
        let index = self.packages.len();
        self.packages.push(package);
        for descriptor in descriptors.split(',') {
            let descriptor = unquote(descriptor);
            if !descriptor.is_empty() {
                self.by_descriptor.insert(descriptor.to_string(), index);
            }
        }
    }

    fn parse_classic(content: &str) -> Result<Self, String> {
        let mut lock = Self::default();
        let mut current: Option<(String, LockedPackage)> = None;
        let mut section = ClassicSection::Other;

        for (number, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let indent = raw.len() - raw.trim_start().len();

            if indent == 0 {
                let Some(header) = line.strip_suffix(':') else {
                    return Err(format!("yarn.lock line {}: expected an entry header", number + 1));
                };
                if let Some((descriptors, package)) = current.take() {
                    lock.insert(&descriptors, package);
                }
                current = Some((header.to_string(), LockedPackage::default()));
                section = ClassicSection::Other;
                continue;
            }

            let Some((_, package)) = current.as_mut() else {
                return Err(format!("yarn.lock line {}: field outside of an entry", number + 1));
            };
            if indent <= 2 {
                if let Some(name) = line.strip_suffix(':') {
                    section = if matches!(name, "dependencies" | "optionalDependencies") {
                        ClassicSection::Dependencies
                    } else {
                        ClassicSection::Other
                    };
                } else {
                    section = ClassicSection::Other;
                    if let Some(("version", value)) = split_classic_pair(line) {
                        package.version = value.to_string();
                    }
                }
            } else if section == ClassicSection::Dependencies {
                let Some((name, range)) = split_classic_pair(line) else {
                    return Err(format!("yarn.lock line {}: malformed dependency", number + 1));
                };
                package.dependencies.push((name.to_string(), range.to_string()));
            }
        }
        if let Some((descriptors, package)) = current.take() {
            lock.insert(&descriptors, package);
        }
        Ok(lock)
    }

    fn parse_berry(content: &str) -> Result<Self, String> {
        let root: Value =
            serde_yaml::from_str(content).map_err(|e| format!("invalid yarn.lock: {e}"))?;
        let Value::Mapping(entries) = root else {
            return Err("invalid yarn.lock: expected a mapping".to_string());
        };

        let mut lock = Self::default();
        for (key, entry) in &entries {
            let Some(descriptors) = scalar(key) else { continue };
            if descriptors == "__metadata" {
                continue;
            }
            let version = entry.get("version").and_then(scalar).unwrap_or_default();
            let mut dependencies = string_pairs(entry.get("dependencies"));
            dependencies.extend(string_pairs(entry.get("optionalDependencies")));
            lock.insert(&descriptors, LockedPackage { version, dependencies });
        }
        Ok(lock)
    }
}

/// Splits `name "value"` or `"@scope/name" "value"` into its two parts.
fn split_classic_pair(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = if let Some(quoted) = line.strip_prefix('"') {
        let end = quoted.find('"')?;
        (&quoted[..end], &quoted[end + 1..])
    } else {
        line.split_once(char::is_whitespace)?
    };
    Some((key, unquote(rest)))
}

impl LockfileResolver for DescriptorLockfile {
    fn root_key(&self, _importer: &str) -> String {
        String::new()
    }

    fn resolve(&self, _parent_key: &str, name: &str, range: &str) -> Option<Resolved> {
        let index = self
            .by_descriptor
            .get(&format!("{name}@{range}"))
            .or_else(|| self.by_descriptor.get(&format!("{name}@npm:{range}")))?;
        let package = &self.packages[*index];
        Some(Resolved {
            key: format!("#{index}"),
            version: package.version.clone(),
            dependencies: package.dependencies.clone(),
        })
    }
}

// --- pnpm ---

/// `pnpm-lock.yaml`: importers map names to versions, packages are keyed
/// by `name@version`.
struct PnpmLockfile {
    importers: HashMap<String, HashMap<String, String>>,
    packages: HashMap<String, Vec<(String, String)>>,
}

const PNPM_IMPORTER_SECTIONS: [&str; 3] =
    ["dependencies", "devDependencies", "optionalDependencies"];

impl PnpmLockfile {
    fn parse(content: &str) -> Result<Self, String> {
        let root: Value =
            serde_yaml::from_str(content).map_err(|e| format!("invalid pnpm-lock.yaml: {e}"))?;

        let mut importers = HashMap::new();
        if let Some(Value::Mapping(entries)) = root.get("importers") {
            for (dir, importer) in entries {
                if let Some(dir) = scalar(dir) {
                    importers.insert(dir, importer_versions(importer));
                }
            }
        } else {
            importers.insert(".".to_string(), importer_versions(&root));
        }

        let mut packages: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for section in ["packages", "snapshots"] {
            let Some(Value::Mapping(entries)) = root.get(section) else { continue };
            for (key, entry) in entries {
                let Some(key) = scalar(key) else { continue };
                let mut dependencies = string_pairs(entry.get("dependencies"));
                dependencies.extend(string_pairs(entry.get("optionalDependencies")));
                let slot = packages.entry(pnpm_key(&key)).or_default();
                for dependency in dependencies {
                    if !slot.contains(&dependency) {
                        slot.push(dependency);
                    }
                }
            }
        }
        Ok(Self { importers, packages })
    }
}

fn importer_versions(importer: &Value) -> HashMap<String, String> {
    let mut versions = HashMap::new();
    for section in PNPM_IMPORTER_SECTIONS {
        let Some(Value::Mapping(entries)) = importer.get(section) else { continue };
        for (name, spec) in entries {
            let version = match spec {
                Value::Mapping(_) => spec.get("version").and_then(scalar),
                other => scalar(other),
            };
            if let (Some(name), Some(version)) = (scalar(name), version) {
                versions.insert(name, version);
            }
        }
    }
    versions
}

/// Strips peer-dependency suffixes: `1.0.0(react@18.2.0)` and `1.0.0_react@18.2.0`.
fn pnpm_version(raw: &str) -> &str {
    let raw = raw.split('(').next().unwrap_or(raw);
    raw.split('_').next().unwrap_or(raw)
}

/// Canonicalizes a package key to `name@version`.
///
/// Accepts `/name@version` (v6), `name@version` (v9) and `/name/version` (v5).
fn pnpm_key(raw: &str) -> String {
    let key = raw.trim_start_matches('/');
    let key = key.split('(').next().unwrap_or(key);
    if let Some((name, version)) = key.rsplit_once('/') {
        if version.starts_with(|c: char| c.is_ascii_digit()) {
            return format!("{name}@{}", pnpm_version(version));
        }
    }
    let name = descriptor_name(key);
    let version = key.get(name.len() + 1..).unwrap_or_default();
    format!("{name}@{}", pnpm_version(version))
}

impl LockfileResolver for PnpmLockfile {
    fn root_key(&self, importer: &str) -> String {
        format!("importer:{importer}")
    }

    fn root_dependencies(&self, manifest: &PackageManifest, importer: &str) -> Vec<(String, String)> {
        let dir = if importer.is_empty() { "." } else { importer };
        let versions = self.importers.get(dir);
        manifest
            .declared_dependencies()
            .into_iter()
            .map(|(name, range)| {
                let version = versions
                    .and_then(|v| v.get(&name))
                    .cloned()
                    .unwrap_or_else(|| format!("missing:{range}"));
                (name, version)
            })
            .collect()
    }

    fn resolve(&self, _parent_key: &str, name: &str, version: &str) -> Option<Resolved> {
        if version.starts_with("missing:") {
            return None;
        }
        if version.starts_with("link:") || version.starts_with("file:") {
            return Some(Resolved {
                key: format!("{name}@{version}"),
                version: version.to_string(),
                dependencies: Vec::new(),
            });
        }
        let key = if version.starts_with('/') {
            pnpm_key(version)
        } else {
            format!("{name}@{}", pnpm_version(version))
        };
        let resolved_version = key.get(descriptor_name(&key).len() + 1..).unwrap_or_default();
        Some(Resolved {
            version: resolved_version.to_string(),
            dependencies: self.packages.get(&key).cloned().unwrap_or_default(),
            key,
        })
    }
}
