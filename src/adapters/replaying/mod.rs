//! Replaying adapters that serve recorded interactions.

pub mod build_index;
pub mod git;

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cassette::replayer::CassetteReplayer;

pub use build_index::ReplayingBuildIndex;
pub use git::ReplayingGitRepo;

/// Shared handle to a replayer; every replaying adapter draws from it.
pub type SharedReplayer = Arc<Mutex<CassetteReplayer>>;

/// Replays the next `port::method` interaction for `input`.
///
/// Mirror of `recording::record_result`. A recorded `{"Err": msg}` comes
/// back as `Err(msg)`, as does a cassette miss or an undecodable output.
pub(crate) fn replay<T, I>(
    replayer: &SharedReplayer,
    port: &str,
    method: &str,
    input: &I,
) -> Result<T, String>
where
    T: DeserializeOwned,
    I: Serialize + ?Sized,
{
    let input = serde_json::to_value(input).map_err(|e| format!("{port}::{method}: bad input: {e}"))?;
    let interaction = replayer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .next_interaction(port, method, &input)
        .map_err(|miss| miss.to_string())?;

    if let Some(err) = interaction.output.get("Err") {
        return Err(err.as_str().unwrap_or("unknown error").to_string());
    }
    let value = interaction.output.get("Ok").cloned().unwrap_or(interaction.output);
    serde_json::from_value(value).map_err(|e| format!("{port}::{method}: failed to deserialize: {e}"))
}
