//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the resolver core and an
//! external system (version control, the remote build index).
//! Implementations live in `src/adapters/`.

pub mod build_index;
pub mod git;

pub use build_index::{BranchHistory, BuildIndex, BuildRef, BuildStatus, IndexFuture};
pub use git::{Commit, GitError, GitRepo, RevList};
