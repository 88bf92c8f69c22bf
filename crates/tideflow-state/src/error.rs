//! State file error types

use thiserror::Error;

/// State persistence errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("State is locked by {holder} since {acquired_at}")]
    Locked { holder: String, acquired_at: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;
