//! Module path normalization.
//!
//! Bundlers name modules relative to the project directory, absolutely, or
//! as virtual ids. Everything is rewritten to repository-root-relative,
//! `/`-separated form so it can be compared with `git diff` output.

/// Story entry files across bundler generations, relative to the project
/// directory. `{config_dir}` is substituted.
const ENTRY_FILE_TEMPLATES: [&str; 5] = [
    "./{config_dir}/generated-stories-entry.js",
    "./generated-stories-entry.js",
    "./storybook-stories.js",
    "/virtual:/@storybook/builder-vite/storybook-stories.js",
    "./node_modules/.cache/storybook/default/dev-server/storybook-stories.js",
];

/// Prefix of bundler-synthetic module ids.
const VIRTUAL_PREFIX: &str = "/virtual:";

/// Rewrites module paths relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNormalizer {
    root: String,
    base_dir: String,
}

impl PathNormalizer {
    /// `root` is the absolute repository root; `base_dir` is the project
    /// directory relative to it (empty for the root itself).
    #[must_use]
    pub fn new(root: &str, base_dir: &str) -> Self {
        Self {
            root: root.replace('\\', "/").trim_end_matches('/').to_string(),
            base_dir: clean(&base_dir.replace('\\', "/")),
        }
    }

    /// Normalizes a module name, keeping any query string.
    #[must_use]
    pub fn normalize(&self, name: &str) -> String {
        let name = strip_aggregate_suffix(name).replace('\\', "/");
        if name.starts_with(VIRTUAL_PREFIX) {
            return name;
        }
        let (path, query) = split_query(&name);
        let normalized = if path.starts_with('/') {
            match path.strip_prefix(&self.root).and_then(|rest| rest.strip_prefix('/')) {
                Some(relative) => clean(relative),
                None => path.to_string(),
            }
        } else {
            clean(&join(&self.base_dir, path))
        };
        format!("{normalized}{query}")
    }

    /// Normalizes a project-relative directory such as the configuration
    /// directory.
    #[must_use]
    pub fn normalize_dir(&self, dir: &str) -> String {
        let dir = dir.trim_end_matches('/');
        if dir.starts_with('/') {
            self.normalize(dir)
        } else {
            self.normalize(&format!("./{dir}"))
        }
    }

    /// Normalized story entry file paths, without query strings.
    #[must_use]
    pub fn entry_files(&self, config_dir: &str) -> Vec<String> {
        let config_dir = config_dir.trim_start_matches("./").trim_end_matches('/');
        ENTRY_FILE_TEMPLATES
            .iter()
            .map(|template| self.normalize(&template.replace("{config_dir}", config_dir)))
            .collect()
    }
}

/// Removes a `?query` suffix.
#[must_use]
pub fn strip_query(path: &str) -> &str {
    split_query(path).0
}

fn split_query(path: &str) -> (&str, &str) {
    path.find('?').map_or((path, ""), |i| path.split_at(i))
}

/// Removes the ` + 3 modules` suffix bundlers put on concatenated modules.
fn strip_aggregate_suffix(name: &str) -> &str {
    if let Some((head, tail)) = name.rsplit_once(" + ") {
        let count = tail.strip_suffix(" modules").or_else(|| tail.strip_suffix(" module"));
        if count.is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())) {
            return head;
        }
    }
    name
}

fn join(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}/{path}")
    }
}

/// Resolves `.` and `..` segments and drops empty ones.
fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Returns `true` if `path` is `dir` or lies beneath it.
#[must_use]
pub fn is_under(path: &str, dir: &str) -> bool {
    let path = strip_query(path);
    !dir.is_empty()
        && (path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/')))
}

/// Package name a vendored module path belongs to, taken from its last
/// `node_modules/` segment.
#[must_use]
pub fn package_name(path: &str) -> Option<&str> {
    let path = strip_query(path);
    let start = path.rfind("node_modules/")? + "node_modules/".len();
    let rest = &path[start..];
    let mut parts = rest.splitn(3, '/');
    let first = parts.next().filter(|p| !p.is_empty())?;
    if first.starts_with('@') {
        let second = parts.next().filter(|p| !p.is_empty())?;
        Some(&rest[..first.len() + 1 + second.len()])
    } else {
        Some(first)
    }
}

/// Returns `true` for bundler runtime modules that are never user code.
#[must_use]
pub fn is_bundler_runtime(name: &str) -> bool {
    name.starts_with("(webpack)") || name.contains("/webpack/runtime/")
}
