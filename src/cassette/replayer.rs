//! Replays recorded interactions from a cassette.

use std::collections::{HashMap, VecDeque};

use super::format::{Cassette, Interaction};

/// Key for indexing interactions by port, method and input.
///
/// Keying on the input lets concurrent callers (parallel diff jobs) receive
/// their own answers regardless of the order they ask in.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct InteractionKey {
    port: String,
    method: String,
    input: String,
}

impl InteractionKey {
    fn new(port: &str, method: &str, input: &serde_json::Value) -> Self {
        Self { port: port.to_string(), method: method.to_string(), input: input.to_string() }
    }
}

/// Raised when a replay asks for something the cassette never saw.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cassette has no (more) interactions for {port}::{method} with input {input}")]
pub struct ReplayMiss {
    /// Requested port.
    pub port: String,
    /// Requested method.
    pub method: String,
    /// Requested input, as JSON.
    pub input: String,
}

/// Replays interactions from a loaded cassette.
///
/// Identical calls are served in recording order.
#[derive(Debug)]
pub struct CassetteReplayer {
    queues: HashMap<InteractionKey, VecDeque<Interaction>>,
}

impl CassetteReplayer {
    /// Create a new replayer from a loaded cassette.
    #[must_use]
    pub fn new(cassette: &Cassette) -> Self {
        let mut queues: HashMap<InteractionKey, VecDeque<Interaction>> = HashMap::new();
        for interaction in &cassette.interactions {
            let key = InteractionKey::new(&interaction.port, &interaction.method, &interaction.input);
            queues.entry(key).or_default().push_back(interaction.clone());
        }
        Self { queues }
    }

    /// Return the next interaction for the given port, method and input.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayMiss`] if the cassette has no unconsumed interaction
    /// for that call.
    pub fn next_interaction(
        &mut self,
        port: &str,
        method: &str,
        input: &serde_json::Value,
    ) -> Result<Interaction, ReplayMiss> {
        let key = InteractionKey::new(port, method, input);
        self.queues.get_mut(&key).and_then(VecDeque::pop_front).ok_or(ReplayMiss {
            port: key.port,
            method: key.method,
            input: key.input,
        })
    }

    /// Number of interactions not yet replayed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn interaction(seq: u64, method: &str, input: serde_json::Value, output: serde_json::Value) -> Interaction {
        Interaction { seq, port: "git".into(), method: method.into(), input, output }
    }

    fn make_cassette(interactions: Vec<Interaction>) -> Cassette {
        Cassette { name: "test".into(), recorded_at: Utc::now(), commit: "abc".into(), interactions }
    }

    #[test]
    fn serves_by_input_regardless_of_call_order() {
        let cassette = make_cassette(vec![
            interaction(0, "commit_exists", json!({"hash": "a"}), json!({"Ok": true})),
            interaction(1, "commit_exists", json!({"hash": "b"}), json!({"Ok": false})),
        ]);
        let mut replayer = CassetteReplayer::new(&cassette);

        let b = replayer.next_interaction("git", "commit_exists", &json!({"hash": "b"})).unwrap();
        assert_eq!(b.seq, 1);
        let a = replayer.next_interaction("git", "commit_exists", &json!({"hash": "a"})).unwrap();
        assert_eq!(a.seq, 0);
        assert_eq!(replayer.remaining(), 0);
    }

    #[test]
    fn repeated_calls_replay_in_recording_order() {
        let cassette = make_cassette(vec![
            interaction(0, "is_clean", json!(null), json!({"Ok": false})),
            interaction(1, "is_clean", json!(null), json!({"Ok": true})),
        ]);
        let mut replayer = CassetteReplayer::new(&cassette);
        assert_eq!(replayer.next_interaction("git", "is_clean", &json!(null)).unwrap().seq, 0);
        assert_eq!(replayer.next_interaction("git", "is_clean", &json!(null)).unwrap().seq, 1);
    }

    #[test]
    fn exhausted_or_unknown_calls_are_misses() {
        let cassette = make_cassette(vec![interaction(0, "is_clean", json!(null), json!({"Ok": true}))]);
        let mut replayer = CassetteReplayer::new(&cassette);
        let _ = replayer.next_interaction("git", "is_clean", &json!(null)).unwrap();

        let miss = replayer.next_interaction("git", "is_clean", &json!(null)).unwrap_err();
        assert!(miss.to_string().contains("git::is_clean"));
        assert!(replayer.next_interaction("index", "branch_history", &json!({"branch": "main"})).is_err());
    }
}
