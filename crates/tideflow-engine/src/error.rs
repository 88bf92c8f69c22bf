//! Reconciliation error types
//!
//! Errors come in two tiers. [`ReconcileError`] is fatal: a plan that cannot be
//! trusted is never executed. [`StepError`] is recorded per entry by the
//! executor and never stops the rest of the run.

use crate::entry::StepAction;
use thiserror::Error;

/// Fatal errors raised while planning (or before applying)
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Neither desired nor recorded entries were provided")]
    EntriesNotFound,

    #[error("No handler registered for type '{entry_type}' (entry: {entry_id})")]
    HandlerNotFound {
        entry_type: String,
        entry_id: String,
    },

    #[error(
        "Corrupted state references: expected {expected} entries to be resolved, found {found}"
    )]
    CorruptedStateReferences { expected: usize, found: usize },
}

/// Errors raised by a [`StepHandler`](crate::handler::StepHandler)
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(
        "Cannot replace {service_name} resource in place: {current_id} is already provisioned (candidate: {candidate_id})"
    )]
    ReplaceResource {
        service_name: String,
        candidate_id: String,
        current_id: String,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(#[from] serde_json::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Recoverable, per-entry errors collected while applying a plan
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Failed to {action} {entry_id}: {source}")]
    Handler {
        entry_id: String,
        action: StepAction,
        #[source]
        source: HandlerError,
    },

    #[error("Skipped {action} of {entry_id}: dependency {dependency} did not reconcile")]
    DependencyFailed {
        entry_id: String,
        action: StepAction,
        dependency: String,
    },

    #[error("Skipped delete of {entry_id}: dependent {dependent} is still present")]
    DependentRemains { entry_id: String, dependent: String },

    #[error("Entry {entry_id} references unknown entry {reference}")]
    MissingReference { entry_id: String, reference: String },

    #[error("No handler registered for type '{entry_type}' (entry: {entry_id})")]
    HandlerNotFound {
        entry_type: String,
        entry_id: String,
    },
}

impl StepError {
    /// The entry this error was recorded for
    pub fn entry_id(&self) -> &str {
        match self {
            StepError::Handler { entry_id, .. }
            | StepError::DependencyFailed { entry_id, .. }
            | StepError::DependentRemains { entry_id, .. }
            | StepError::MissingReference { entry_id, .. }
            | StepError::HandlerNotFound { entry_id, .. } => entry_id,
        }
    }

    /// Returns the handler error if this step failed inside a handler
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            StepError::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
