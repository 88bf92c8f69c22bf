//! TideFlow Reconciliation Engine
//!
//! This crate moves a recorded resource graph towards a desired one. It plans a
//! dependency-ordered list of create/replace/update/delete steps and executes
//! them through pluggable, per-type handlers.
//!
//! The engine performs no I/O of its own. Resource drivers (functions, tables,
//! gateways, roles, ...) implement [`StepHandler`] and do the actual
//! provisioning.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ desired graph│   │recorded graph│
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!        ┌────────▼─────────┐      ┌───────────────────┐
//!        │   plan_steps     │◄─────│  HandlerRegistry  │
//!        │ (waves, actions) │      │ type → StepHandler│
//!        └────────┬─────────┘      └─────────┬─────────┘
//!        ┌────────▼─────────┐                │
//!        │   apply_steps    │◄───────────────┘
//!        │ (StepContext per │
//!        │  entry, errors)  │
//!        └────────┬─────────┘
//!        ┌────────▼─────────┐
//!        │ result + errors  │  → recorded graph of the next run
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! # async fn run(
//! #     desired: tideflow_engine::EntryStates,
//! #     recorded: tideflow_engine::EntryStates,
//! #     handlers: tideflow_engine::HandlerRegistry,
//! # ) -> tideflow_engine::Result<()> {
//! use tideflow_engine::{ApplyOptions, apply_steps, plan_steps};
//!
//! let steps = plan_steps(Some(&desired), Some(&recorded), &handlers)?;
//! let outcome = apply_steps(
//!     &steps,
//!     Some(&desired),
//!     Some(&recorded),
//!     &handlers,
//!     &ApplyOptions::default(),
//! )
//! .await?;
//! for error in &outcome.errors {
//!     eprintln!("{error}");
//! }
//! // persist `outcome.result` as the next recorded graph
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod entry;
pub mod error;
pub mod executor;
pub mod handler;
pub mod hydrate;
pub mod planner;

// Re-exports
pub use context::StepContext;
pub use entry::{EntryState, EntryStates, StepAction, StepState, combine_entries};
pub use error::{HandlerError, ReconcileError, Result, StepError};
pub use executor::{
    ApplyOptions, ApplyOutcome, Reconciliation, apply_steps, is_empty_change, reconcile,
};
pub use handler::{HandlerRegistry, StepHandler, replace_guard};
pub use hydrate::{HydratedEntry, HydratedStates, hydrate_state};
pub use planner::{PlanSummary, has_changes, plan_steps, summarize};
