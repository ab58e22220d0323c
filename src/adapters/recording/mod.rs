//! Recording adapters that capture interactions to cassettes.

pub mod build_index;
pub mod git;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::cassette::recorder::CassetteRecorder;

/// Shared handle to the recorder every recording adapter appends to.
pub type SharedRecorder = Arc<Mutex<CassetteRecorder>>;

/// Record a `Result<T, E>` interaction using the Ok/Err JSON convention.
///
/// Mirror of `replaying::replay` - serializes the Result for recording.
///
/// Convention:
/// - `Ok(v)` is serialized as `{"Ok": v}`
/// - `Err(e)` is serialized as `{"Err": e.to_string()}`
pub(crate) fn record_result<T, E, I>(
    recorder: &SharedRecorder,
    port: &str,
    method: &str,
    input: &I,
    result: &Result<T, E>,
) where
    T: Serialize,
    E: std::fmt::Display,
    I: Serialize + ?Sized,
{
    let input_json = to_json(input, port, method);
    let output_json = match result {
        Ok(v) => serde_json::json!({ "Ok": to_json(v, port, method) }),
        Err(e) => serde_json::json!({ "Err": e.to_string() }),
    };

    let mut guard = recorder.lock().unwrap_or_else(PoisonError::into_inner);
    guard.record(port, method, input_json, output_json);
}

fn to_json<T: Serialize + ?Sized>(value: &T, port: &str, method: &str) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(port, method, error = %e, "could not serialize interaction for recording");
        serde_json::Value::Null
    })
}
