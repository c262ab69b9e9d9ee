//! Error types for the staff desk.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::TaskStatus;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Assignment and locking errors surfaced to the calling handler.
///
/// None of these are retried inside the desk; the caller decides whether to
/// re-poll or show the reason to the operator.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    TaskNotFound { id: Uuid },

    #[error("Worker {id} not found")]
    WorkerNotFound { id: Uuid },

    #[error("Task {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: TaskStatus },

    #[error("Task {id} is being processed by {holder} until {expires_at}")]
    LockConflict {
        id: Uuid,
        holder: Uuid,
        expires_at: DateTime<Utc>,
    },

    #[error("Task {id} cannot {action}: {reason}")]
    InvalidTransition {
        id: Uuid,
        action: &'static str,
        reason: String,
    },

    #[error("Availability of worker {id} is locked by an administrator")]
    AvailabilityLocked { id: Uuid },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type alias for the desk.
pub type Result<T> = std::result::Result<T, Error>;
