//! Scratch directories shared by concurrent diff jobs.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tempfile::TempDir;

/// Registry of every scratch directory created during one diff.
///
/// Each job gets its own directory; the registry only ever grows, and all
/// directories are removed when it is dropped or [`ScratchDirs::cleanup`]
/// is called, whichever job failed.
#[derive(Debug, Default)]
pub struct ScratchDirs {
    parent: Option<PathBuf>,
    dirs: Mutex<Vec<TempDir>>,
}

impl ScratchDirs {
    /// A registry whose directories are created under `parent` instead of
    /// the system temporary directory.
    #[must_use]
    pub fn under(parent: Option<PathBuf>) -> Self {
        Self { parent, dirs: Mutex::default() }
    }

    /// Creates a fresh, empty scratch directory and tracks it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(&self) -> io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("snapimpact-");
        let dir = match &self.parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner).push(dir);
        Ok(path)
    }

    /// Number of directories created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dirs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no directory was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every tracked directory, reporting the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first removal error; the remaining directories are
    /// still removed.
    pub fn cleanup(self) -> io::Result<()> {
        let dirs = self.dirs.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut first_error = None;
        for dir in dirs {
            if let Err(err) = dir.close() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
