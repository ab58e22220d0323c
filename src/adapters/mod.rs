//! Port implementations: live, recording and replaying.

pub mod live;
pub mod recording;
pub mod replaying;

/// Port name for git interactions in cassettes.
pub(crate) const GIT_PORT: &str = "git";
/// Port name for build index interactions in cassettes.
pub(crate) const INDEX_PORT: &str = "index";
