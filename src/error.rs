//! Error types for MobiGait

use thiserror::Error;

/// Errors surfaced by configuration, persistence, and host bindings.
///
/// Sample processing itself never fails; degraded sensor conditions resolve
/// to defaults or silent no-ops.
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persistence queue closed")]
    QueueClosed,

    #[error("Failed to acquire lock: {0}")]
    LockPoisoned(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Errors reported by a step/gait record store backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}
