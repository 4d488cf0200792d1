use thiserror::Error;
use uuid::Uuid;

use crate::model::{EmployeeId, EventRef};

/// Errors surfaced by a `Repository` implementation. The in-memory reference implementation in
/// `repository.rs` only ever returns `NotFound`; a durable backend would map its own I/O and
/// constraint-violation errors into this enum's variants.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RotationError {
    #[error("day_of_week must be between 0 and 6, got {0}")]
    InvalidDayOfWeek(u8),

    #[error("employee {0} does not exist")]
    UnknownEmployee(EmployeeId),

    #[error("rotation exception {0} not found")]
    UnknownException(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{} rotation assignment(s) failed validation: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<RotationError>),
}

/// Top-level crate error. See SPEC_FULL.md §7 for the error-handling design this mirrors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("invalid rotation configuration: {0}")]
    InvalidRotation(#[from] RotationError),

    #[error("event {event_ref} is invalid: {reason}")]
    InvalidEvent { event_ref: EventRef, reason: String },

    #[error("refusing to write assignment for event {event_ref} outside its valid window")]
    AssignmentOutsideWindow { event_ref: EventRef },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
