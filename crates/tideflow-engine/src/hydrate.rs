//! Reverse-dependency view over a combined graph

use crate::entry::{EntryState, EntryStates};
use std::collections::{BTreeMap, BTreeSet};

/// An entry annotated with the ids of entries that depend on it
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedEntry {
    pub entry: EntryState,
    pub dependents: Vec<String>,
}

/// Graph annotated with `dependents`, keyed by `entry_id`
#[derive(Debug, Clone, Default)]
pub struct HydratedStates {
    entries: BTreeMap<String, HydratedEntry>,
}

impl HydratedStates {
    pub fn get(&self, entry_id: &str) -> Option<&HydratedEntry> {
        self.entries.get(entry_id)
    }

    /// Ids depending on `entry_id`; empty if the entry is unknown
    pub fn dependents_of(&self, entry_id: &str) -> &[String] {
        self.entries
            .get(entry_id)
            .map(|h| h.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &HydratedEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute `dependents` for every entry of `entries`
///
/// Dependency ids that are not part of the graph are skipped; resolving them
/// is the planner's job.
pub fn hydrate_state(entries: &EntryStates) -> HydratedStates {
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for entry in entries {
        for dependency in &entry.dependencies {
            if entries.contains(dependency) {
                dependents
                    .entry(dependency.as_str())
                    .or_default()
                    .insert(entry.entry_id.as_str());
            }
        }
    }

    let entries = entries
        .iter()
        .map(|entry| {
            let ids = dependents
                .get(entry.entry_id.as_str())
                .map(|set| set.iter().map(|id| id.to_string()).collect())
                .unwrap_or_default();
            (
                entry.entry_id.clone(),
                HydratedEntry {
                    entry: entry.clone(),
                    dependents: ids,
                },
            )
        })
        .collect();

    HydratedStates { entries }
}
