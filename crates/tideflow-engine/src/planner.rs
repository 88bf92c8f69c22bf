//! Plan computation
//!
//! Diffs the desired graph against the recorded one and emits steps in two
//! phases: create/replace/update in dependency order, then delete in reverse
//! dependency order. Each phase numbers its waves from 0.

use crate::entry::{EntryState, EntryStates, StepAction, StepState, combine_entries};
use crate::error::{ReconcileError, Result};
use crate::handler::HandlerRegistry;
use crate::hydrate::hydrate_state;
use std::collections::HashSet;

/// Compute the ordered steps that move `old` towards `new`
///
/// Fails fast if both graphs are missing, if a type has no handler, or if a
/// dependency reference cannot be resolved (dangling or cyclic).
pub fn plan_steps(
    new: Option<&EntryStates>,
    old: Option<&EntryStates>,
    handlers: &HandlerRegistry,
) -> Result<Vec<StepState>> {
    if new.is_none() && old.is_none() {
        return Err(ReconcileError::EntriesNotFound);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut steps = Vec::new();

    if let Some(new) = new {
        steps.extend(plan_upserts(new, old, handlers, &mut visited)?);
    }

    if let Some(old) = old {
        steps.extend(plan_deletes(new, old, &visited)?);
    }

    tracing::info!("Planned {}", summarize(&steps));
    Ok(steps)
}

fn plan_upserts<'a>(
    new: &'a EntryStates,
    old: Option<&EntryStates>,
    handlers: &HandlerRegistry,
    visited: &mut HashSet<&'a str>,
) -> Result<Vec<StepState>> {
    let mut steps = Vec::new();
    let mut order = 0;

    loop {
        let batch: Vec<&EntryState> = new
            .iter()
            .filter(|e| !visited.contains(e.entry_id.as_str()))
            .filter(|e| e.dependencies.iter().all(|d| visited.contains(d.as_str())))
            .collect();

        if batch.is_empty() {
            break;
        }

        tracing::debug!("Wave {}: {} entries ready", order, batch.len());

        for candidate in batch {
            let handler = handlers.resolve(&candidate.entry_type, &candidate.entry_id)?;

            let action = match old.and_then(|o| o.get(&candidate.entry_id)) {
                None => StepAction::Create,
                Some(current)
                    if current.entry_type != candidate.entry_type
                        || !handler.equals(candidate, current) =>
                {
                    StepAction::Replace
                }
                Some(_) => StepAction::Update,
            };

            steps.push(StepState::new(candidate.entry_id.clone(), action, order));
            visited.insert(candidate.entry_id.as_str());
        }

        order += 1;
    }

    if visited.len() < new.len() {
        return Err(ReconcileError::CorruptedStateReferences {
            expected: new.len(),
            found: visited.len(),
        });
    }

    Ok(steps)
}

fn plan_deletes(
    new: Option<&EntryStates>,
    old: &EntryStates,
    upserted: &HashSet<&str>,
) -> Result<Vec<StepState>> {
    let hydrated = hydrate_state(&combine_entries(new, Some(old)));

    let candidates: Vec<&str> = old
        .ids()
        .filter(|id| !upserted.contains(id))
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut steps = Vec::new();
    let mut order = 0;

    loop {
        let batch: Vec<&str> = candidates
            .iter()
            .copied()
            .filter(|id| !visited.contains(id))
            .filter(|id| {
                hydrated
                    .dependents_of(id)
                    .iter()
                    .all(|d| visited.contains(d.as_str()))
            })
            .collect();

        if batch.is_empty() {
            break;
        }

        tracing::debug!("Delete wave {}: {} entries ready", order, batch.len());

        for entry_id in batch {
            steps.push(StepState::new(entry_id, StepAction::Delete, order));
            visited.insert(entry_id);
        }

        order += 1;
    }

    if visited.len() != candidates.len() {
        return Err(ReconcileError::CorruptedStateReferences {
            expected: candidates.len(),
            found: visited.len(),
        });
    }

    Ok(steps)
}

/// Summary of planned steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub replace: usize,
    pub update: usize,
    pub delete: usize,
}

impl PlanSummary {
    pub fn total(&self) -> usize {
        self.create + self.replace + self.update + self.delete
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to replace, {} to update, {} to delete",
            self.create, self.replace, self.update, self.delete
        )
    }
}

/// Count steps by action
pub fn summarize(steps: &[StepState]) -> PlanSummary {
    steps
        .iter()
        .fold(PlanSummary::default(), |mut summary, step| {
            match step.action {
                StepAction::Create => summary.create += 1,
                StepAction::Replace => summary.replace += 1,
                StepAction::Update => summary.update += 1,
                StepAction::Delete => summary.delete += 1,
            }
            summary
        })
}

/// Whether the plan certainly changes something
///
/// Updates are excluded: whether they do anything is only known once
/// `preview` runs.
pub fn has_changes(steps: &[StepState]) -> bool {
    steps.iter().any(|s| s.action != StepAction::Update)
}
