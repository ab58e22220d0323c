//! Live adapters for real external interactions.

pub mod build_index;
pub mod git;
