//! Service context bundling the port trait objects for one run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::adapters::live::build_index::LiveBuildIndex;
use crate::adapters::live::git::LiveGitRepo;
use crate::adapters::recording::build_index::RecordingBuildIndex;
use crate::adapters::recording::git::RecordingGitRepo;
use crate::adapters::recording::SharedRecorder;
use crate::adapters::replaying::{ReplayingBuildIndex, ReplayingGitRepo};
use crate::cassette::format::Cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::cassette::replayer::CassetteReplayer;
use crate::config::Config;
use crate::ports::{BuildIndex, GitRepo};

/// Bundles the port trait objects into a single context.
///
/// Constructors wire up different adapter implementations (live, recording,
/// replaying). Analysis code only ever sees the trait objects.
pub struct ServiceContext {
    /// Version control of the working copy.
    pub git: Box<dyn GitRepo>,
    /// Remote index of recorded builds.
    pub index: Box<dyn BuildIndex>,
    /// Optional cassette recorder; written to disk on drop.
    recorder: Option<SharedRecorder>,
}

impl ServiceContext {
    /// Creates a live context running git in the current directory and
    /// querying the configured build index.
    #[must_use]
    pub fn live(config: &Config) -> Self {
        Self { git: Box::new(LiveGitRepo::new()), index: Box::new(live_index(config)), recorder: None }
    }

    /// Creates a recording context that writes a cassette file on drop.
    ///
    /// Uses live adapters for the actual work. This is the developer-only
    /// mechanism for capturing cassettes via `SNAPIMPACT_RECORD`.
    #[must_use]
    pub fn recording(path: &Path, config: &Config) -> Self {
        let recorder: SharedRecorder =
            Arc::new(Mutex::new(CassetteRecorder::new(path, "snapimpact-session", "unknown")));
        Self {
            git: Box::new(RecordingGitRepo::new(Box::new(LiveGitRepo::new()), Arc::clone(&recorder))),
            index: Box::new(RecordingBuildIndex::new(Box::new(live_index(config)), Arc::clone(&recorder))),
            recorder: Some(recorder),
        }
    }

    /// Creates a replaying context from a cassette file.
    ///
    /// Both ports draw from the same replayer, keyed by port, method and
    /// input, so call order across ports does not matter.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be read or parsed.
    pub fn replaying(path: &Path) -> Result<Self, String> {
        let cassette = Cassette::load(path)?;
        let replayer = Arc::new(Mutex::new(CassetteReplayer::new(&cassette)));
        Ok(Self {
            git: Box::new(ReplayingGitRepo::new(Arc::clone(&replayer))),
            index: Box::new(ReplayingBuildIndex::new(replayer)),
            recorder: None,
        })
    }

    /// Stamps the recorded cassette with the commit it was captured at.
    pub fn set_recorded_commit(&self, commit: &str) {
        if let Some(recorder) = &self.recorder {
            recorder.lock().unwrap_or_else(PoisonError::into_inner).set_commit(commit);
        }
    }

    /// Writes the cassette now, if recording. Returns where it went.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette cannot be written.
    pub fn save_recording(&self) -> Result<Option<PathBuf>, String> {
        let Some(recorder) = &self.recorder else {
            return Ok(None);
        };
        recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .save()
            .map(Some)
            .map_err(|e| format!("Failed to write cassette: {e}"))
    }
}

impl Drop for ServiceContext {
    fn drop(&mut self) {
        if let Err(e) = self.save_recording() {
            tracing::warn!(error = %e, "cassette was not saved");
        }
    }
}

fn live_index(config: &Config) -> LiveBuildIndex {
    LiveBuildIndex::new(&config.index_url, config.project_token.clone(), config.request_attempts)
}
