//! Constraint violations, validation results, and swap/decision value types.
//!
//! Grounded on `validation_types.py`: a `ConstraintViolation` carries a type, message,
//! severity and free-form details; a `ValidationResult` accumulates violations and flips
//! `is_valid` the moment a hard one is added.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::model::{EmployeeId, EventRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ConstraintType {
    PastDate,
    CompanyHoliday,
    TimeOff,
    Availability,
    Role,
    /// Covers both the per-day and per-week Core caps — the weekly check reuses this type
    /// rather than a distinct one so a weekly-cap block is bumpable the same way a daily one is.
    DailyLimit,
    AlreadyScheduled,
    DueDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ConstraintSeverity {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub constraint_type: ConstraintType,
    pub message: String,
    pub severity: ConstraintSeverity,
    pub details: HashMap<String, String>,
}

impl ConstraintViolation {
    pub fn hard(constraint_type: ConstraintType, message: impl Into<String>) -> Self {
        ConstraintViolation {
            constraint_type,
            message: message.into(),
            severity: ConstraintSeverity::Hard,
            details: HashMap::new(),
        }
    }

    pub fn soft(constraint_type: ConstraintType, message: impl Into<String>) -> Self {
        ConstraintViolation {
            constraint_type,
            message: message.into(),
            severity: ConstraintSeverity::Soft,
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.severity, self.constraint_type, self.message
        )
    }
}

/// Two of these are "bumpable": the only violations that a rotation assignment is allowed
/// to override by bumping the conflicting Core event out of the way (§4.4.2, Wave 1).
pub const BUMPABLE_CONSTRAINTS: [ConstraintType; 2] =
    [ConstraintType::DailyLimit, ConstraintType::AlreadyScheduled];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<ConstraintViolation>,
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            is_valid: true,
            violations: Vec::new(),
        }
    }

    pub fn add_violation(&mut self, violation: ConstraintViolation) {
        if violation.severity == ConstraintSeverity::Hard {
            self.is_valid = false;
        }
        self.violations.push(violation);
    }

    pub fn hard_violations(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == ConstraintSeverity::Hard)
    }

    pub fn soft_violations(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violations
            .iter()
            .filter(|v| v.severity == ConstraintSeverity::Soft)
    }

    pub fn has_hard_violations(&self) -> bool {
        self.hard_violations().next().is_some()
    }

    /// True when every hard violation present is in `BUMPABLE_CONSTRAINTS` — i.e. the proposal
    /// is only blocked by conditions the caller is willing to resolve via a bump (§4.4.2).
    pub fn blocked_only_by_bumpable(&self) -> bool {
        self.hard_violations()
            .all(|v| BUMPABLE_CONSTRAINTS.contains(&v.constraint_type))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapProposal {
    pub high_priority_event_ref: EventRef,
    pub low_priority_event_ref: EventRef,
    pub reason: String,
    pub employee_id: EmployeeId,
    pub proposed_date: NaiveDate,
}

impl std::fmt::Display for SwapProposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Swap Event {} -> Event {} (Reason: {})",
            self.low_priority_event_ref, self.high_priority_event_ref, self.reason
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingDecision {
    pub event_ref: EventRef,
    pub employee_id: Option<EmployeeId>,
    pub schedule_datetime: Option<NaiveDateTime>,
    pub success: bool,
    pub is_swap: bool,
    pub swap_proposal: Option<SwapProposal>,
    pub failure_reason: Option<String>,
    pub validation_result: Option<ValidationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_violation_flips_is_valid() {
        let mut result = ValidationResult::new();
        assert!(result.is_valid);
        result.add_violation(ConstraintViolation::soft(ConstraintType::Role, "prefer not"));
        assert!(result.is_valid);
        result.add_violation(ConstraintViolation::hard(ConstraintType::PastDate, "too late"));
        assert!(!result.is_valid);
        assert_eq!(result.hard_violations().count(), 1);
        assert_eq!(result.soft_violations().count(), 1);
    }

    #[test]
    fn blocked_only_by_bumpable_distinguishes_violation_kinds() {
        let mut result = ValidationResult::new();
        result.add_violation(ConstraintViolation::hard(
            ConstraintType::DailyLimit,
            "already has a core event",
        ));
        assert!(result.blocked_only_by_bumpable());

        result.add_violation(ConstraintViolation::hard(ConstraintType::TimeOff, "on leave"));
        assert!(!result.blocked_only_by_bumpable());
    }
}
