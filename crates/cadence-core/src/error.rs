//! Error types for Cadence.

use thiserror::Error;

use crate::role::Role;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Spawn error ({role}): {reason}")]
    Spawn { role: Role, reason: String },

    #[error("Transfer violation: {0}")]
    TransferViolation(String),

    #[error("Handoff schema error: {0}")]
    HandoffSchema(String),

    #[error("Contexts already spawned")]
    AlreadySpawned,

    #[error("Orchestrator is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a spawn error for the given role.
    pub fn spawn(role: Role, reason: impl Into<String>) -> Self {
        Self::Spawn {
            role,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
