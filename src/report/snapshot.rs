//! Environment snapshots: the bindings visible in a context after an evaluation.

use chrono::{DateTime, Utc};
use rhai::Dynamic;
use std::collections::BTreeMap;

/// Immutable capture of the session bindings.
#[derive(Debug, Clone)]
pub struct EnvironmentSnapshot {
    generation: u64,
    captured_at: DateTime<Utc>,
    bindings: BTreeMap<String, Dynamic>,
}

impl EnvironmentSnapshot {
    pub fn new(generation: u64, bindings: BTreeMap<String, Dynamic>) -> Self {
        Self {
            generation,
            captured_at: Utc::now(),
            bindings,
        }
    }

    /// Generation of the context the snapshot was taken from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// `(name, type, value)` rows, sorted by name.
    pub fn rows(&self) -> Vec<(String, String, String)> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.clone(), value.type_name().to_string(), value.to_string()))
            .collect()
    }
}

/// Receives every published snapshot.
pub trait EnvironmentObserver: Send + Sync {
    fn environment_updated(&self, snapshot: &EnvironmentSnapshot);
}
