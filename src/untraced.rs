//! Glob list for files that are never traced.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::ImpactError;

/// Compiled "do not trace" globs.
///
/// `*` does not cross `/`; use `**` for any depth.
#[derive(Debug, Clone)]
pub struct Untraced {
    set: GlobSet,
    patterns: Vec<String>,
}

impl Untraced {
    /// Compiles the given glob patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::Config`] for an invalid pattern.
    pub fn new(patterns: &[String]) -> Result<Self, ImpactError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| ImpactError::Config(format!("invalid untraced glob `{pattern}`: {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| ImpactError::Config(format!("invalid untraced globs: {e}")))?;
        Ok(Self { set, patterns: patterns.to_vec() })
    }

    /// A list that matches nothing.
    #[must_use]
    pub fn none() -> Self {
        Self { set: GlobSet::empty(), patterns: Vec::new() }
    }

    /// Returns `true` if `path` (repository-relative) matches any glob.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        !self.patterns.is_empty() && self.set.is_match(path)
    }
}

impl Default for Untraced {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_star_stays_in_one_directory() {
        let untraced = Untraced::new(&["src/*.ts".to_string()]).unwrap();
        assert!(untraced.matches("src/index.ts"));
        assert!(!untraced.matches("src/nested/index.ts"));
    }

    #[test]
    fn double_star_crosses_directories() {
        let untraced = Untraced::new(&["**/package.json".to_string()]).unwrap();
        assert!(untraced.matches("package.json"));
        assert!(untraced.matches("packages/app/package.json"));
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let err = Untraced::new(&["src/[".to_string()]).unwrap_err();
        assert!(matches!(err, ImpactError::Config(_)));
    }

    #[test]
    fn empty_list_matches_nothing() {
        assert!(!Untraced::none().matches("anything"));
    }
}
