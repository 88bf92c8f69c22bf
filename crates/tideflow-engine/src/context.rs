//! Per-step view of neighbouring entries

use crate::entry::{EntryState, EntryStates};
use crate::error::StepError;
use crate::hydrate::HydratedStates;

/// Read-only context handed to a handler while one entry is processed
///
/// Holds owned snapshots of the entry's dependencies, connections and
/// dependents as they stood when the step's wave started, so handlers can read
/// sibling results (e.g., an already created role's identifier).
#[derive(Debug, Clone)]
pub struct StepContext {
    entry_id: String,
    force: bool,
    dependencies: Vec<EntryState>,
    connections: Vec<EntryState>,
    dependents: Vec<EntryState>,
}

/// Graphs an entry id is resolved against, in lookup order
pub(crate) struct Lookup<'a> {
    pub working: &'a EntryStates,
    pub desired: Option<&'a EntryStates>,
    pub recorded: Option<&'a EntryStates>,
}

impl Lookup<'_> {
    pub fn resolve(&self, entry_id: &str) -> Option<&EntryState> {
        self.working
            .get(entry_id)
            .or_else(|| self.desired.and_then(|d| d.get(entry_id)))
            .or_else(|| self.recorded.and_then(|r| r.get(entry_id)))
    }
}

impl StepContext {
    /// Context with no neighbours, for driving a handler outside a plan
    pub fn detached(entry_id: impl Into<String>, force: bool) -> Self {
        Self {
            entry_id: entry_id.into(),
            force,
            dependencies: Vec::new(),
            connections: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub(crate) fn build(
        entry: &EntryState,
        lookup: &Lookup<'_>,
        hydrated: &HydratedStates,
        force: bool,
    ) -> Result<Self, StepError> {
        let resolve_all = |ids: &[String]| -> Result<Vec<EntryState>, StepError> {
            ids.iter()
                .map(|id| {
                    lookup
                        .resolve(id)
                        .cloned()
                        .ok_or_else(|| StepError::MissingReference {
                            entry_id: entry.entry_id.clone(),
                            reference: id.clone(),
                        })
                })
                .collect()
        };

        Ok(Self {
            entry_id: entry.entry_id.clone(),
            force,
            dependencies: resolve_all(&entry.dependencies)?,
            connections: resolve_all(&entry.connections)?,
            dependents: resolve_all(hydrated.dependents_of(&entry.entry_id))?,
        })
    }

    /// Id of the entry being processed
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Caller-supplied force flag
    pub fn force(&self) -> bool {
        self.force
    }

    /// Entries this entry depends on, optionally restricted to one type
    pub fn dependencies(&self, entry_type: Option<&str>) -> Vec<&EntryState> {
        filter_type(&self.dependencies, entry_type)
    }

    /// Entries this entry is connected to, optionally restricted to one type
    pub fn connections(&self, entry_type: Option<&str>) -> Vec<&EntryState> {
        filter_type(&self.connections, entry_type)
    }

    /// Entries depending on this entry, optionally restricted to one type
    pub fn dependents(&self, entry_type: Option<&str>) -> Vec<&EntryState> {
        filter_type(&self.dependents, entry_type)
    }

    pub fn dependency(&self, entry_id: &str) -> Option<&EntryState> {
        find_id(&self.dependencies, entry_id)
    }

    pub fn connection(&self, entry_id: &str) -> Option<&EntryState> {
        find_id(&self.connections, entry_id)
    }

    pub fn dependent(&self, entry_id: &str) -> Option<&EntryState> {
        find_id(&self.dependents, entry_id)
    }
}

fn filter_type<'a>(entries: &'a [EntryState], entry_type: Option<&str>) -> Vec<&'a EntryState> {
    entries
        .iter()
        .filter(|e| entry_type.is_none_or(|t| e.entry_type == t))
        .collect()
}

fn find_id<'a>(entries: &'a [EntryState], entry_id: &str) -> Option<&'a EntryState> {
    entries.iter().find(|e| e.entry_id == entry_id)
}
