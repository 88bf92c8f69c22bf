//! TideFlow State
//!
//! Persists the recorded entry graph between deployment runs. The result graph
//! of one apply is saved here and loaded back as the recorded graph of the
//! next one.
//!
//! Layout inside the state directory:
//!
//! ```text
//! <state_dir>/
//!   state.json          current snapshot
//!   state.json.backup   previous snapshot
//!   lock.json           present while a run holds the state
//! ```
//!
//! The `tide` binary only reads state (`load`). Writing it back with
//! [`StateManager::save`], holding [`StateManager::acquire_lock`] for the
//! duration of an apply and falling back to
//! [`StateManager::load_backup`] are left to the binary that hosts the
//! resource drivers and runs `apply_steps`.

pub mod error;
pub mod store;

// Re-exports
pub use error::{Result, StateError};
pub use store::{STATE_VERSION, StateLock, StateManager, StateSnapshot};
