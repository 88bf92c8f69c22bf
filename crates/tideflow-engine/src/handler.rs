//! Step handler contract and registry
//!
//! Every resource type (functions, tables, gateways, roles, ...) is driven by
//! one [`StepHandler`]. Handlers are looked up by the entry's type tag through
//! a [`HandlerRegistry`].

use crate::context::StepContext;
use crate::entry::EntryState;
use crate::error::{HandlerError, ReconcileError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-type provisioning behavior
///
/// `equals` runs at plan time and decides whether an existing entry may be
/// updated in place. `preview` runs at apply time and decides whether an
/// update has anything to do. `create`, `update` and `delete` perform the side
/// effects.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Whether `candidate` can be reconciled with `current` without replacement
    fn equals(&self, candidate: &EntryState, current: &EntryState) -> bool;

    /// Provision a new resource and return its result
    async fn create(
        &self,
        candidate: &EntryState,
        context: &StepContext,
    ) -> Result<serde_json::Value, HandlerError>;

    /// Provision `candidate` in place of `current`
    ///
    /// Handlers that cannot do this for an already provisioned entry should
    /// return the error produced by [`replace_guard`].
    async fn replace(
        &self,
        candidate: &EntryState,
        current: &EntryState,
        context: &StepContext,
    ) -> Result<serde_json::Value, HandlerError>;

    /// Describe what `update` would change; `None` or an empty value means nothing
    async fn preview(
        &self,
        candidate: &EntryState,
        current: &EntryState,
        context: &StepContext,
    ) -> Result<Option<serde_json::Value>, HandlerError>;

    /// Apply the change and return the part of the result that changed
    async fn update(
        &self,
        candidate: &EntryState,
        current: &EntryState,
        context: &StepContext,
    ) -> Result<Option<serde_json::Value>, HandlerError>;

    /// Tear the resource down
    async fn delete(&self, candidate: &EntryState, context: &StepContext)
    -> Result<(), HandlerError>;
}

/// Reject replacing an entry that already owns a provisioned resource
///
/// Replacement across entry boundaries is modeled as delete-of-old plus
/// create-of-new, so a conforming handler only replaces entries that have no
/// `result` yet.
pub fn replace_guard(
    service_name: &str,
    candidate: &EntryState,
    current: &EntryState,
) -> Result<(), HandlerError> {
    if current.result.is_some() {
        return Err(HandlerError::ReplaceResource {
            service_name: service_name.to_string(),
            candidate_id: candidate.entry_id.clone(),
            current_id: current.entry_id.clone(),
        });
    }
    Ok(())
}

/// Registry mapping type tags to handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry_type: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(entry_type.into(), handler);
    }

    pub fn with_handler(
        mut self,
        entry_type: impl Into<String>,
        handler: Arc<dyn StepHandler>,
    ) -> Self {
        self.register(entry_type, handler);
        self
    }

    pub fn get(&self, entry_type: &str) -> Option<&Arc<dyn StepHandler>> {
        self.handlers.get(entry_type)
    }

    /// Look up the handler for an entry, failing if the type is unregistered
    pub fn resolve(
        &self,
        entry_type: &str,
        entry_id: &str,
    ) -> Result<&Arc<dyn StepHandler>, ReconcileError> {
        self.handlers
            .get(entry_type)
            .ok_or_else(|| ReconcileError::HandlerNotFound {
                entry_type: entry_type.to_string(),
                entry_id: entry_id.to_string(),
            })
    }

    pub fn contains(&self, entry_type: &str) -> bool {
        self.handlers.contains_key(entry_type)
    }

    /// Registered type tags, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.types())
            .finish()
    }
}
