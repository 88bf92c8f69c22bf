//! State file management

use crate::error::{Result, StateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tideflow_engine::EntryStates;
use tokio::fs;

pub const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";
const STALE_LOCK_HOURS: i64 = 1;

/// Recorded graph plus bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Entries as left by the last apply
    pub entries: EntryStates,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            entries: EntryStates::new(),
        }
    }
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: EntryStates) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Replace the recorded entries with the result of an apply
    pub fn replace_entries(&mut self, entries: EntryStates) {
        self.entries = entries;
        self.updated_at = Utc::now();
    }
}

/// Reads and writes the state directory
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the recorded state; a missing file is an empty state
    pub async fn load(&self) -> Result<StateSnapshot> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateSnapshot::new());
        }

        let content = fs::read_to_string(&path).await?;
        let snapshot: StateSnapshot = serde_json::from_str(&content)?;

        if snapshot.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: snapshot.version,
                supported: STATE_VERSION,
            });
        }

        tracing::debug!("Loaded state with {} entries", snapshot.entries.len());
        Ok(snapshot)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} entries", snapshot.entries.len());
        Ok(())
    }

    /// Load the previous snapshot kept by the last save, if any
    pub async fn load_backup(&self) -> Result<Option<StateSnapshot>> {
        let backup = self.backup_path();
        if !backup.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&backup).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < STALE_LOCK_HOURS {
                return Err(StateError::Locked {
                    holder: lock_info.holder,
                    acquired_at: lock_info.acquired_at.to_rfc3339(),
                });
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
