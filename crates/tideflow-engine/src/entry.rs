//! Entry graph data model
//!
//! A graph is a flat map of entry ids to [`EntryState`] records. Edges are
//! plain id lists, so the whole map serializes as a JSON object keyed by id
//! and can be stored between deployment runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One declared or previously provisioned resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryState {
    /// Identifier, unique within a graph
    pub entry_id: String,

    /// Resource type tag used to pick a handler (e.g., "function", "table")
    #[serde(rename = "type")]
    pub entry_type: String,

    /// Entries that must be ready before this one
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Informational references; never affect ordering
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<String>,

    /// Declared configuration, opaque to the engine
    #[serde(default)]
    pub parameters: serde_json::Value,

    /// Provisioning result written by the executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl EntryState {
    pub fn new(
        entry_id: impl Into<String>,
        entry_type: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            entry_type: entry_type.into(),
            dependencies: Vec::new(),
            connections: Vec::new(),
            parameters,
            result: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_connections<I, S>(mut self, connections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connections = connections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Deserialize the parameters into a driver-specific type
    pub fn parameters_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.parameters.clone())
    }

    /// Deserialize the result, if any, into a driver-specific type
    pub fn result_as<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.result
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()))
    }

    pub fn depends_on(&self, entry_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == entry_id)
    }
}

/// Graph of entries keyed by `entry_id`
///
/// Iteration follows id order, which keeps planning deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryStates {
    entries: BTreeMap<String, EntryState>,
}

impl EntryStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry under its own id, returning the previous one
    pub fn insert(&mut self, entry: EntryState) -> Option<EntryState> {
        self.entries.insert(entry.entry_id.clone(), entry)
    }

    pub fn get(&self, entry_id: &str) -> Option<&EntryState> {
        self.entries.get(entry_id)
    }

    pub fn remove(&mut self, entry_id: &str) -> Option<EntryState> {
        self.entries.remove(entry_id)
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.entries.contains_key(entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryState> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Get entries by type
    pub fn by_type(&self, entry_type: &str) -> Vec<&EntryState> {
        self.entries
            .values()
            .filter(|e| e.entry_type == entry_type)
            .collect()
    }
}

impl FromIterator<EntryState> for EntryStates {
    fn from_iter<I: IntoIterator<Item = EntryState>>(iter: I) -> Self {
        let mut states = EntryStates::new();
        for entry in iter {
            states.insert(entry);
        }
        states
    }
}

impl IntoIterator for EntryStates {
    type Item = EntryState;
    type IntoIter = std::collections::btree_map::IntoValues<String, EntryState>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<'a> IntoIterator for &'a EntryStates {
    type Item = &'a EntryState;
    type IntoIter = std::collections::btree_map::Values<'a, String, EntryState>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Merge desired and recorded graphs; desired entries win on conflict
pub fn combine_entries(new: Option<&EntryStates>, old: Option<&EntryStates>) -> EntryStates {
    let mut combined = new.cloned().unwrap_or_default();
    if let Some(old) = old {
        for entry in old {
            if !combined.contains(&entry.entry_id) {
                combined.insert(entry.clone());
            }
        }
    }
    combined
}

/// Action planned for a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Provision an entry that has no recorded counterpart
    Create,
    /// Re-provision an entry whose identity changed
    Replace,
    /// Reconcile an existing entry in place
    Update,
    /// Tear down an entry no longer declared
    Delete,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepAction::Create => write!(f, "create"),
            StepAction::Replace => write!(f, "replace"),
            StepAction::Update => write!(f, "update"),
            StepAction::Delete => write!(f, "delete"),
        }
    }
}

/// A planned step: entry, action and wave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub entry_id: String,
    pub action: StepAction,
    /// Wave index within the step's phase; steps sharing a wave are independent
    pub order: usize,
}

impl StepState {
    pub fn new(entry_id: impl Into<String>, action: StepAction, order: usize) -> Self {
        Self {
            entry_id: entry_id.into(),
            action,
            order,
        }
    }

    /// Whether this step belongs to the delete phase
    pub fn is_delete(&self) -> bool {
        self.action == StepAction::Delete
    }
}
