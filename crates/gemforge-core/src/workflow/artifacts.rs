//! Artifact store — the run's shared name → content map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflow::state::AgentResult;
use crate::workflow::INITIAL_PROMPT_ARTIFACT_NAME;

/// Artifacts produced so far in a run. Keys may be overwritten but are
/// never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactStore {
    entries: BTreeMap<String, String>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding only the initial prompt under `INITIAL_PROMPT`.
    pub fn seeded(initial_prompt: impl Into<String>) -> Self {
        let mut store = Self::new();
        store.insert(INITIAL_PROMPT_ARTIFACT_NAME, initial_prompt);
        store
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(name.into(), content.into());
    }

    /// Publish a completed stage's outputs in one batch. Results are applied
    /// in order, so for duplicate names the later result wins.
    pub fn merge(&mut self, results: &[AgentResult]) {
        for result in results {
            self.entries
                .insert(result.output_artifact_name.clone(), result.output.clone());
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
