//! The module graph emitted by the project's build.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ImpactError;

/// Stable module identifier: bundlers emit either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    /// Numeric id.
    Number(u64),
    /// String id, usually a path.
    Name(String),
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => f.write_str(s),
        }
    }
}

/// A module graph: the `modules` list of a bundler stats file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Every module in the bundle.
    #[serde(default)]
    pub modules: Vec<StatsModule>,
}

/// One module and the modules that caused its inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsModule {
    /// Identifier; absent for some synthetic modules.
    #[serde(default)]
    pub id: Option<ModuleId>,
    /// Module path as the bundler saw it.
    pub name: String,
    /// Modules concatenated into this one.
    #[serde(default)]
    pub modules: Vec<Submodule>,
    /// Importers of this module.
    #[serde(default)]
    pub reasons: Vec<Reason>,
}

/// A module folded into an aggregate module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodule {
    /// Module path.
    pub name: String,
}

/// Why a module was included: the importing module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reason {
    /// Importer path; entry points have none.
    #[serde(default)]
    pub module_name: Option<String>,
}

impl Stats {
    /// Reads and parses a stats file.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::Stats`] if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ImpactError> {
        let stats_error = |message: String| ImpactError::Stats {
            path: path.display().to_string(),
            message,
        };
        let content = fs::read_to_string(path).map_err(|e| stats_error(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| stats_error(e.to_string()))
    }
}
