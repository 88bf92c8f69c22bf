//! Plan execution
//!
//! Walks a plan wave by wave, dispatching each step to the handler registered
//! for its entry type. Failures are contained per entry: an entry's recorded
//! state is either fully replaced by a successful step or left exactly as it
//! was, and the run always continues with the remaining steps.
//!
//! There is no atomicity across entries. Retrying, rolling forward or
//! compensating after a partial failure is up to the caller, based on the
//! returned error list.

use crate::context::{Lookup, StepContext};
use crate::entry::{EntryState, EntryStates, StepAction, StepState, combine_entries};
use crate::error::{HandlerError, ReconcileError, Result, StepError};
use crate::handler::{HandlerRegistry, StepHandler};
use crate::hydrate::{HydratedStates, hydrate_state};
use crate::planner::plan_steps;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// Options for [`apply_steps`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Passed through to every handler via [`StepContext::force`]
    pub force: bool,

    /// Run the steps of one wave concurrently instead of one after another
    pub concurrent_waves: bool,
}

/// New recorded state plus every error collected along the way
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub result: EntryStates,
    pub errors: Vec<StepError>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Steps planned and the outcome of applying them
#[derive(Debug)]
pub struct Reconciliation {
    pub steps: Vec<StepState>,
    pub outcome: ApplyOutcome,
}

/// Execute `steps` against the handlers
///
/// The create/replace/update phase completes before any delete starts, and
/// within a phase wave N completes before wave N+1 starts. Only a missing pair
/// of graphs is fatal; everything else ends up in [`ApplyOutcome::errors`].
pub async fn apply_steps(
    steps: &[StepState],
    new: Option<&EntryStates>,
    old: Option<&EntryStates>,
    handlers: &HandlerRegistry,
    options: &ApplyOptions,
) -> Result<ApplyOutcome> {
    if new.is_none() && old.is_none() {
        return Err(ReconcileError::EntriesNotFound);
    }

    let hydrated = hydrate_state(&combine_entries(new, old));
    let mut working = old.cloned().unwrap_or_default();
    let mut failed: HashSet<String> = HashSet::new();
    let mut errors = Vec::new();

    let mut ordered = steps.to_vec();
    ordered.sort_by_key(|s| (s.is_delete(), s.order));

    for wave in ordered.chunk_by(|a, b| a.is_delete() == b.is_delete() && a.order == b.order) {
        tracing::debug!(
            "Applying {} wave {} ({} steps)",
            if wave[0].is_delete() { "delete" } else { "upsert" },
            wave[0].order,
            wave.len()
        );

        let prepared: Vec<Prepared> = {
            let lookup = Lookup {
                working: &working,
                desired: new,
                recorded: old,
            };
            wave.iter()
                .map(|step| prepare(step, &lookup, &hydrated, &failed, handlers, options))
                .collect()
        };

        let outcomes = if options.concurrent_waves {
            join_all(prepared.into_iter().map(Prepared::run)).await
        } else {
            let mut outcomes = Vec::with_capacity(prepared.len());
            for p in prepared {
                outcomes.push(p.run().await);
            }
            outcomes
        };

        for outcome in outcomes {
            match outcome.slot {
                Slot::Write(entry) => {
                    working.insert(entry);
                }
                Slot::Remove => {
                    working.remove(&outcome.entry_id);
                }
                Slot::Keep => {}
            }
            if let Some(error) = outcome.error {
                tracing::warn!("{}", error);
                failed.insert(outcome.entry_id);
                errors.push(error);
            }
        }
    }

    if !errors.is_empty() {
        tracing::warn!("Apply finished with {} errors", errors.len());
    }

    Ok(ApplyOutcome {
        result: working,
        errors,
    })
}

/// Plan and apply in one go
pub async fn reconcile(
    new: Option<&EntryStates>,
    old: Option<&EntryStates>,
    handlers: &HandlerRegistry,
    options: &ApplyOptions,
) -> Result<Reconciliation> {
    let steps = plan_steps(new, old, handlers)?;
    let outcome = apply_steps(&steps, new, old, handlers, options).await?;
    Ok(Reconciliation { steps, outcome })
}

/// What a finished step does to its entry's slot in the result graph
enum Slot {
    Write(EntryState),
    Remove,
    Keep,
}

struct StepOutcome {
    entry_id: String,
    slot: Slot,
    error: Option<StepError>,
}

impl StepOutcome {
    fn kept(entry_id: &str, error: StepError) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            slot: Slot::Keep,
            error: Some(error),
        }
    }
}

enum Operation {
    Create {
        candidate: EntryState,
    },
    Replace {
        candidate: EntryState,
        current: EntryState,
    },
    Update {
        candidate: EntryState,
        current: EntryState,
    },
    Delete {
        candidate: EntryState,
    },
}

struct StepJob {
    entry_id: String,
    handler: Arc<dyn StepHandler>,
    operation: Operation,
    context: StepContext,
}

enum Prepared {
    Ready(StepJob),
    Done(StepOutcome),
}

impl Prepared {
    async fn run(self) -> StepOutcome {
        match self {
            Prepared::Ready(job) => job.run().await,
            Prepared::Done(outcome) => outcome,
        }
    }
}

fn prepare(
    step: &StepState,
    lookup: &Lookup<'_>,
    hydrated: &HydratedStates,
    failed: &HashSet<String>,
    handlers: &HandlerRegistry,
    options: &ApplyOptions,
) -> Prepared {
    let entry_id = step.entry_id.as_str();
    let missing = || {
        Prepared::Done(StepOutcome::kept(
            entry_id,
            StepError::MissingReference {
                entry_id: entry_id.to_string(),
                reference: entry_id.to_string(),
            },
        ))
    };

    let desired = lookup.desired.and_then(|d| d.get(entry_id));
    let recorded = lookup.recorded.and_then(|r| r.get(entry_id));

    let operation = match step.action {
        StepAction::Create => match desired {
            Some(candidate) => Operation::Create {
                candidate: candidate.clone(),
            },
            None => return missing(),
        },
        StepAction::Replace | StepAction::Update => match (desired, recorded) {
            (Some(candidate), Some(current)) if step.action == StepAction::Replace => {
                Operation::Replace {
                    candidate: candidate.clone(),
                    current: current.clone(),
                }
            }
            (Some(candidate), Some(current)) => Operation::Update {
                candidate: candidate.clone(),
                current: current.clone(),
            },
            _ => return missing(),
        },
        StepAction::Delete => match lookup.working.get(entry_id).or(recorded) {
            Some(candidate) => Operation::Delete {
                candidate: candidate.clone(),
            },
            None => return missing(),
        },
    };

    let candidate = operation.candidate();

    if step.action == StepAction::Delete {
        // A kept entry may still carry its recorded dependencies even when
        // its desired version dropped them.
        let dependent = hydrated
            .dependents_of(entry_id)
            .iter()
            .find(|d| failed.contains(d.as_str()))
            .or_else(|| {
                lookup
                    .working
                    .iter()
                    .find(|e| e.entry_id != entry_id && e.depends_on(entry_id))
                    .map(|e| &e.entry_id)
            });
        if let Some(dependent) = dependent {
            return Prepared::Done(StepOutcome::kept(
                entry_id,
                StepError::DependentRemains {
                    entry_id: entry_id.to_string(),
                    dependent: dependent.clone(),
                },
            ));
        }
    } else if let Some(dependency) = candidate
        .dependencies
        .iter()
        .find(|d| failed.contains(d.as_str()))
    {
        return Prepared::Done(StepOutcome::kept(
            entry_id,
            StepError::DependencyFailed {
                entry_id: entry_id.to_string(),
                action: step.action,
                dependency: dependency.clone(),
            },
        ));
    }

    let Some(handler) = handlers.get(&candidate.entry_type) else {
        return Prepared::Done(StepOutcome::kept(
            entry_id,
            StepError::HandlerNotFound {
                entry_type: candidate.entry_type.clone(),
                entry_id: entry_id.to_string(),
            },
        ));
    };

    let context = match StepContext::build(candidate, lookup, hydrated, options.force) {
        Ok(context) => context,
        Err(error) => return Prepared::Done(StepOutcome::kept(entry_id, error)),
    };

    Prepared::Ready(StepJob {
        entry_id: entry_id.to_string(),
        handler: Arc::clone(handler),
        operation,
        context,
    })
}

impl Operation {
    fn candidate(&self) -> &EntryState {
        match self {
            Operation::Create { candidate }
            | Operation::Replace { candidate, .. }
            | Operation::Update { candidate, .. }
            | Operation::Delete { candidate } => candidate,
        }
    }

    fn action(&self) -> StepAction {
        match self {
            Operation::Create { .. } => StepAction::Create,
            Operation::Replace { .. } => StepAction::Replace,
            Operation::Update { .. } => StepAction::Update,
            Operation::Delete { .. } => StepAction::Delete,
        }
    }
}

impl StepJob {
    async fn run(self) -> StepOutcome {
        let StepJob {
            entry_id,
            handler,
            operation,
            context,
        } = self;
        let action = operation.action();
        tracing::info!("{} {}", action, entry_id);

        let slot = match operation {
            Operation::Create { candidate } => handler
                .create(&candidate, &context)
                .await
                .map(|result| Slot::Write(candidate.with_result(result))),
            Operation::Replace { candidate, current } => handler
                .replace(&candidate, &current, &context)
                .await
                .map(|result| Slot::Write(candidate.with_result(result))),
            Operation::Update { candidate, current } => {
                update(handler.as_ref(), candidate, &current, &context).await
            }
            Operation::Delete { candidate } => handler
                .delete(&candidate, &context)
                .await
                .map(|()| Slot::Remove),
        };

        match slot {
            Ok(slot) => StepOutcome {
                entry_id,
                slot,
                error: None,
            },
            Err(source) => StepOutcome {
                error: Some(StepError::Handler {
                    entry_id: entry_id.clone(),
                    action,
                    source,
                }),
                entry_id,
                slot: Slot::Keep,
            },
        }
    }
}

async fn update(
    handler: &dyn StepHandler,
    mut candidate: EntryState,
    current: &EntryState,
    context: &StepContext,
) -> std::result::Result<Slot, HandlerError> {
    let preview = handler.preview(&candidate, current, context).await?;

    if is_empty_change(preview.as_ref()) {
        tracing::debug!("{} is up to date", candidate.entry_id);
        candidate.result = current.result.clone();
        return Ok(Slot::Write(candidate));
    }

    let partial = handler.update(&candidate, current, context).await?;
    candidate.result = merge_result(current.result.clone(), partial);
    Ok(Slot::Write(candidate))
}

/// Whether a `preview` result means "nothing to change"
///
/// `None`, `null`, `{}` and `[]` all count as empty.
pub fn is_empty_change(preview: Option<&serde_json::Value>) -> bool {
    match preview {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::Object(map)) => map.is_empty(),
        Some(serde_json::Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Shallow-merge a partial update into the prior result
fn merge_result(
    prior: Option<serde_json::Value>,
    partial: Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    match (prior, partial) {
        (prior, None) => prior,
        (Some(serde_json::Value::Object(mut base)), Some(serde_json::Value::Object(changes))) => {
            base.extend(changes);
            Some(serde_json::Value::Object(base))
        }
        (_, Some(value)) => Some(value),
    }
}
