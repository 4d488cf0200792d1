pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod model;
pub mod repository;
pub mod rotation;
pub mod types;
pub mod validator;

pub use config::SchedulerConfig;
pub use conflict::{CapacityStatus, ConflictResolver};
pub use engine::{DeterministicRanker, EmployeeRanker, SchedulingEngine};
pub use error::{RepositoryError, RotationError, SchedulerError};
pub use model::{
    AssignmentStatus, CompanyHoliday, DigitalSubtype, Employee, EmployeeId, Event, EventCondition,
    EventRef, EventType, ExistingSchedule, JobTitle, PendingAssignment, RotationAssignment,
    RotationException, RotationType, RunStatus, RunType, ScheduledLike, SchedulerRun, TimeOff,
    WeeklyAvailability,
};
pub use repository::{InMemoryRepository, Repository};
pub use rotation::RotationManager;
pub use types::{
    ConstraintSeverity, ConstraintType, ConstraintViolation, SchedulingDecision, SwapProposal,
    ValidationResult, BUMPABLE_CONSTRAINTS,
};
pub use validator::ConstraintValidator;
