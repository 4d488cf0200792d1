//! Resolves conflicts between a higher-priority event that needs a slot and whatever is
//! already occupying it. Grounded on `conflict_resolver.py`: priority is simply "days until
//! due", bumping never touches Supervisor events or anything within the minimum notice window,
//! and a swap is only proposed when it strictly improves the schedule.

use chrono::{Datelike, NaiveDate, TimeDelta};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::RepositoryError;
use crate::model::{EmployeeId, EventRef, EventType, ExistingSchedule};
use crate::repository::Repository;
use crate::types::SwapProposal;

pub struct ConflictResolver<R: Repository> {
    repository: R,
    config: SchedulerConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct CapacityStatus {
    pub scheduled_count: usize,
    pub total_employees: usize,
    pub capacity_used: f64,
    pub is_overbooked: bool,
}

impl<R: Repository> ConflictResolver<R> {
    pub fn new(repository: R, config: SchedulerConfig) -> Self {
        ConflictResolver { repository, config }
    }

    /// Priority score is simply days remaining until the due date, floored at zero; the lower
    /// the score, the more urgent the event already is, so a higher score is "more bumpable".
    pub fn calculate_priority_score(&self, due_date: NaiveDate, reference_date: NaiveDate) -> f64 {
        (due_date - reference_date).num_days().max(0) as f64
    }

    /// Committed schedules on `target_date` that are safe to bump: excludes events inside the
    /// minimum-notice window and Supervisor events (which never stand alone).
    pub async fn find_bumpable_events(
        &self,
        target_date: NaiveDate,
        employee_id: Option<EmployeeId>,
    ) -> Result<Vec<(ExistingSchedule, f64)>, RepositoryError> {
        let events = self.repository.list_events().await?;
        let mut candidates: Vec<(ExistingSchedule, f64)> = self
            .repository
            .list_existing_schedules()
            .await?
            .into_iter()
            .filter(|s| s.schedule_datetime.date() == target_date)
            .filter(|s| employee_id.is_none_or(|id| s.employee_id == id))
            .filter_map(|s| {
                let event = events.iter().find(|e| e.event_ref == s.event_ref)?;
                if event.event_type == EventType::Supervisor {
                    return None;
                }
                let score = self.calculate_priority_score(event.due_datetime.date(), target_date);
                if score < self.config.min_days_to_due as f64 {
                    return None;
                }
                Some((s, score))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(candidates)
    }

    /// Proposes bumping the single most-bumpable event on `target_date` in favor of
    /// `high_priority_event_ref`, but only when doing so is a genuine improvement: the bumped
    /// event's own due date must leave it strictly more slack than the incoming event has.
    pub async fn resolve_conflict(
        &self,
        high_priority_event_ref: EventRef,
        high_priority_score: f64,
        target_date: NaiveDate,
        employee_id: Option<EmployeeId>,
        reason: impl Into<String>,
    ) -> Result<Option<SwapProposal>, RepositoryError> {
        let candidates = self.find_bumpable_events(target_date, employee_id).await?;
        let Some((bumpable, low_priority_score)) = candidates.into_iter().next() else {
            return Ok(None);
        };

        if low_priority_score <= high_priority_score {
            return Ok(None);
        }

        Ok(Some(SwapProposal {
            high_priority_event_ref,
            low_priority_event_ref: bumpable.event_ref,
            reason: reason.into(),
            employee_id: bumpable.employee_id,
            proposed_date: target_date,
        }))
    }

    /// Re-validates a proposal's ordering: the low-priority event must genuinely have more
    /// slack, and must not fall inside the minimum-notice window.
    pub fn validate_swap(&self, high_priority_score: f64, low_priority_score: f64) -> bool {
        low_priority_score > high_priority_score && low_priority_score >= self.config.min_days_to_due as f64
    }

    /// Weekday dates in `[start, due)`, skipping weekends and any date the employee already has
    /// a committed schedule, as alternative homes for an event that cannot stay where it is.
    pub async fn find_alternative_dates(
        &self,
        start: NaiveDate,
        due: NaiveDate,
        employee_id: EmployeeId,
        exclude_dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        let employee_dates: Vec<NaiveDate> = self
            .repository
            .list_existing_schedules()
            .await?
            .into_iter()
            .filter(|s| s.employee_id == employee_id)
            .map(|s| s.schedule_datetime.date())
            .collect();

        let mut alternatives = Vec::new();
        let mut date = start;
        while date < due {
            let is_weekend = matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
            if !is_weekend && !employee_dates.contains(&date) && !exclude_dates.contains(&date) {
                alternatives.push(date);
            }
            date += TimeDelta::days(1);
        }
        Ok(alternatives)
    }

    pub async fn get_capacity_status(&self, target_date: NaiveDate) -> Result<CapacityStatus, RepositoryError> {
        let scheduled_count = self
            .repository
            .list_existing_schedules()
            .await?
            .into_iter()
            .filter(|s| s.schedule_datetime.date() == target_date)
            .count();
        let total_employees = self
            .repository
            .list_employees()
            .await?
            .into_iter()
            .filter(|e| e.is_active)
            .count();

        let capacity_used = if total_employees == 0 {
            0.0
        } else {
            scheduled_count as f64 / total_employees as f64
        };

        Ok(CapacityStatus {
            scheduled_count,
            total_employees,
            capacity_used,
            is_overbooked: total_employees > 0 && scheduled_count > total_employees,
        })
    }
}
