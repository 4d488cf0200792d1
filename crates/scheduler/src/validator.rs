//! Validates a proposed assignment against every business rule, accumulating violations rather
//! than short-circuiting on the first one. Grounded on `constraint_validator.py`: the same fixed
//! check order, the same cross-run pending-assignment coordination, and the same memoized
//! active-run-id cache (invalidated by [`ConstraintValidator::set_current_run`]).

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::RepositoryError;
use crate::model::{AssignmentStatus, CompanyHoliday, Employee, Event, EventType, JobTitle};
use crate::repository::Repository;
use crate::types::{ConstraintSeverity, ConstraintType, ConstraintViolation, ValidationResult};

pub struct ConstraintValidator<R: Repository> {
    repository: R,
    config: SchedulerConfig,
    current_run_id: Mutex<Option<Uuid>>,
    active_run_ids_cache: Mutex<Option<Vec<Uuid>>>,
}

impl<R: Repository> ConstraintValidator<R> {
    pub fn new(repository: R, config: SchedulerConfig) -> Self {
        ConstraintValidator {
            repository,
            config,
            current_run_id: Mutex::new(None),
            active_run_ids_cache: Mutex::new(None),
        }
    }

    /// Tracks the run whose pending assignments should be considered "ours"; invalidates the
    /// active-run-id cache since a new run may itself now be active.
    pub async fn set_current_run(&self, run_id: Uuid) {
        *self.current_run_id.lock().await = Some(run_id);
        *self.active_run_ids_cache.lock().await = None;
    }

    async fn active_run_ids(&self) -> Result<Vec<Uuid>, RepositoryError> {
        if let Some(cached) = self.active_run_ids_cache.lock().await.clone() {
            return Ok(cached);
        }
        let ids = self.repository.list_active_run_ids().await?;
        *self.active_run_ids_cache.lock().await = Some(ids.clone());
        Ok(ids)
    }

    pub async fn validate_assignment(
        &self,
        event: &Event,
        employee: &Employee,
        schedule_datetime: NaiveDateTime,
        duration_minutes: Option<i64>,
        exclude_schedule_ids: &[Uuid],
    ) -> Result<ValidationResult, RepositoryError> {
        let duration_minutes = duration_minutes.unwrap_or(event.estimated_duration_minutes);
        let mut result = ValidationResult::new();

        self.check_past_date(schedule_datetime, &mut result);
        self.check_company_holiday(schedule_datetime, &mut result).await?;
        self.check_time_off(employee, schedule_datetime, &mut result).await?;
        self.check_availability(employee, schedule_datetime, &mut result).await?;
        self.check_role_requirements(event, employee, &mut result);
        self.check_daily_limit(event, employee, schedule_datetime, exclude_schedule_ids, &mut result)
            .await?;
        self.check_weekly_limit(event, employee, schedule_datetime, exclude_schedule_ids, &mut result)
            .await?;
        self.check_already_scheduled(
            event,
            employee,
            schedule_datetime,
            duration_minutes,
            exclude_schedule_ids,
            &mut result,
        )
        .await?;
        self.check_due_date(event, schedule_datetime, &mut result);

        Ok(result)
    }

    /// Safety net applied in every code path: never schedule before "today" in the configured
    /// external timezone.
    fn check_past_date(&self, schedule_datetime: NaiveDateTime, result: &mut ValidationResult) {
        let today = chrono::Utc::now().with_timezone(&self.config.timezone()).date_naive();
        let proposed_date = schedule_datetime.date();
        if proposed_date < today {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::PastDate,
                    format!("cannot schedule in the past ({proposed_date})"),
                )
                .with_detail("proposed_date", proposed_date.to_string())
                .with_detail("today", today.to_string()),
            );
        }
    }

    async fn check_company_holiday(
        &self,
        schedule_datetime: NaiveDateTime,
        result: &mut ValidationResult,
    ) -> Result<(), RepositoryError> {
        let target_date = schedule_datetime.date();
        let is_holiday = self
            .repository
            .list_company_holidays()
            .await?
            .iter()
            .any(|h: &CompanyHoliday| h.date == target_date);

        if is_holiday {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::CompanyHoliday,
                    format!("cannot schedule on {target_date} - company holiday"),
                )
                .with_detail("date", target_date.to_string()),
            );
        }
        Ok(())
    }

    async fn check_time_off(
        &self,
        employee: &Employee,
        schedule_datetime: NaiveDateTime,
        result: &mut ValidationResult,
    ) -> Result<(), RepositoryError> {
        let target_date = schedule_datetime.date();
        let on_leave = self
            .repository
            .list_time_off()
            .await?
            .iter()
            .any(|t| t.employee_id == employee.id && t.covers(target_date));

        if on_leave {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::TimeOff,
                    format!("{} has requested time off on {target_date}", employee.name),
                )
                .with_detail("date", target_date.to_string()),
            );
        }
        Ok(())
    }

    async fn check_availability(
        &self,
        employee: &Employee,
        schedule_datetime: NaiveDateTime,
        result: &mut ValidationResult,
    ) -> Result<(), RepositoryError> {
        let weekday = schedule_datetime.date().weekday();
        let unavailable = self
            .repository
            .list_weekly_availability()
            .await?
            .into_iter()
            .find(|a| a.employee_id == employee.id)
            .map(|a| !a.is_available(weekday))
            .unwrap_or(false);

        if unavailable {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::Availability,
                    format!("{} not available on {weekday}", employee.name),
                )
                .with_detail("day_of_week", weekday.num_days_from_monday().to_string()),
            );
        }
        Ok(())
    }

    fn check_role_requirements(&self, event: &Event, employee: &Employee, result: &mut ValidationResult) {
        if event.event_type.is_juicer()
            && !matches!(employee.job_title, JobTitle::JuicerBarista | JobTitle::ClubSupervisor)
        {
            result.add_violation(ConstraintViolation::hard(
                ConstraintType::Role,
                format!("{} is not a Juicer Barista or Club Supervisor", employee.name),
            ));
        }

        if event.event_type.is_lead_only()
            && !matches!(employee.job_title, JobTitle::LeadEventSpecialist | JobTitle::ClubSupervisor)
        {
            result.add_violation(ConstraintViolation::hard(
                ConstraintType::Role,
                format!("{} requires a Lead or Supervisor role", event.event_type),
            ));
        }

        let allowed_for_supervisor = matches!(
            event.event_type,
            EventType::Supervisor | EventType::Digitals | EventType::Freeosk
        ) || event.event_type.is_juicer();
        if employee.job_title == JobTitle::ClubSupervisor && !allowed_for_supervisor {
            result.add_violation(ConstraintViolation::soft(
                ConstraintType::Role,
                "Club Supervisor should not be assigned to regular events",
            ));
        }
    }

    async fn check_daily_limit(
        &self,
        event: &Event,
        employee: &Employee,
        schedule_datetime: NaiveDateTime,
        exclude_schedule_ids: &[Uuid],
        result: &mut ValidationResult,
    ) -> Result<(), RepositoryError> {
        if event.event_type != EventType::Core {
            return Ok(());
        }
        let target_date = schedule_datetime.date();
        let count = self
            .count_committed_core(employee, exclude_schedule_ids, |d| d == target_date)
            .await?
            + self.count_pending_core(employee, |d| d == target_date).await?;

        if count >= self.config.max_core_per_day as i64 {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::DailyLimit,
                    format!("{} already has {count} core event(s) on {target_date}", employee.name),
                )
                .with_detail("date", target_date.to_string())
                .with_detail("current_count", count.to_string()),
            );
        }
        Ok(())
    }

    async fn check_weekly_limit(
        &self,
        event: &Event,
        employee: &Employee,
        schedule_datetime: NaiveDateTime,
        exclude_schedule_ids: &[Uuid],
        result: &mut ValidationResult,
    ) -> Result<(), RepositoryError> {
        if event.event_type != EventType::Core {
            return Ok(());
        }
        let target_date = schedule_datetime.date();
        let days_since_sunday = (target_date.weekday().num_days_from_monday() + 1) % 7;
        let week_start = target_date - TimeDelta::days(days_since_sunday as i64);
        let week_end = week_start + TimeDelta::days(6);

        let count = self
            .count_committed_core(employee, exclude_schedule_ids, |d| d >= week_start && d <= week_end)
            .await?
            + self
                .count_pending_core(employee, |d| d >= week_start && d <= week_end)
                .await?;

        if count >= self.config.max_core_per_week as i64 {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::DailyLimit,
                    format!(
                        "{} already has {count} core event(s) this week ({week_start} to {week_end})",
                        employee.name
                    ),
                )
                .with_detail("week_start", week_start.to_string())
                .with_detail("week_end", week_end.to_string()),
            );
        }
        Ok(())
    }

    async fn count_committed_core(
        &self,
        employee: &Employee,
        exclude_schedule_ids: &[Uuid],
        date_matches: impl Fn(NaiveDate) -> bool,
    ) -> Result<i64, RepositoryError> {
        let events = self.repository.list_events().await?;
        let count = self
            .repository
            .list_existing_schedules()
            .await?
            .into_iter()
            .filter(|s| s.employee_id == employee.id)
            .filter(|s| !exclude_schedule_ids.contains(&s.id))
            .filter(|s| date_matches(s.schedule_datetime.date()))
            .filter(|s| {
                events
                    .iter()
                    .any(|e| e.event_ref == s.event_ref && e.event_type == EventType::Core)
            })
            .count();
        Ok(count as i64)
    }

    async fn count_pending_core(
        &self,
        employee: &Employee,
        date_matches: impl Fn(NaiveDate) -> bool,
    ) -> Result<i64, RepositoryError> {
        let active_run_ids = self.active_run_ids().await?;
        if active_run_ids.is_empty() {
            return Ok(0);
        }
        let events = self.repository.list_events().await?;
        let count = self
            .repository
            .list_pending_assignments_for_runs(&active_run_ids)
            .await?
            .into_iter()
            .filter(|a| a.employee_id == Some(employee.id))
            .filter(|a| a.failure_reason.is_none() && a.status != AssignmentStatus::Superseded)
            .filter_map(|a| a.schedule_datetime.map(|dt| (a.event_ref, dt)))
            .filter(|(_, dt)| date_matches(dt.date()))
            .filter(|(event_ref, _)| {
                events
                    .iter()
                    .any(|e| e.event_ref == *event_ref && e.event_type == EventType::Core)
            })
            .count();
        Ok(count as i64)
    }

    /// Overlap is only meaningful between events that actually occupy staff time
    /// ([`EventType::blocks_overlap`]); Supervisor events are expected to coincide with the Core
    /// event they pair with, so the check is skipped entirely when scheduling one.
    async fn check_already_scheduled(
        &self,
        event: &Event,
        employee: &Employee,
        schedule_datetime: NaiveDateTime,
        duration_minutes: i64,
        exclude_schedule_ids: &[Uuid],
        result: &mut ValidationResult,
    ) -> Result<(), RepositoryError> {
        if event.event_type == EventType::Supervisor {
            return Ok(());
        }

        let proposed_end = schedule_datetime + TimeDelta::minutes(duration_minutes);
        let events = self.repository.list_events().await?;
        let event_by_ref = |event_ref| events.iter().find(|e| e.event_ref == event_ref);

        for existing in self.repository.list_existing_schedules().await? {
            if existing.employee_id != employee.id || exclude_schedule_ids.contains(&existing.id) {
                continue;
            }
            let Some(existing_event) = event_by_ref(existing.event_ref) else {
                continue;
            };
            if !existing_event.event_type.blocks_overlap() {
                continue;
            }
            let existing_end =
                existing.schedule_datetime + TimeDelta::minutes(existing_event.estimated_duration_minutes);
            if schedule_datetime < existing_end && proposed_end > existing.schedule_datetime {
                result.add_violation(
                    ConstraintViolation::hard(
                        ConstraintType::AlreadyScheduled,
                        format!(
                            "{} already scheduled for {} from {} to {}",
                            employee.name,
                            existing_event.name,
                            existing.schedule_datetime.time(),
                            existing_end.time()
                        ),
                    )
                    .with_detail("schedule_id", existing.id.to_string()),
                );
                return Ok(());
            }
        }

        let active_run_ids = self.active_run_ids().await?;
        if active_run_ids.is_empty() {
            return Ok(());
        }
        for pending in self.repository.list_pending_assignments_for_runs(&active_run_ids).await? {
            if pending.employee_id != Some(employee.id)
                || pending.failure_reason.is_some()
                || pending.status == AssignmentStatus::Superseded
            {
                continue;
            }
            let Some(pending_start) = pending.schedule_datetime else {
                continue;
            };
            let Some(pending_event) = event_by_ref(pending.event_ref) else {
                continue;
            };
            if !pending_event.event_type.blocks_overlap() {
                continue;
            }
            let pending_end = pending_start + TimeDelta::minutes(pending_event.estimated_duration_minutes);
            if schedule_datetime < pending_end && proposed_end > pending_start {
                result.add_violation(
                    ConstraintViolation::hard(
                        ConstraintType::AlreadyScheduled,
                        format!(
                            "{} already assigned to {} from {} to {} (pending approval)",
                            employee.name,
                            pending_event.name,
                            pending_start.time(),
                            pending_end.time()
                        ),
                    )
                    .with_detail("pending_schedule_id", pending.id.to_string()),
                );
                return Ok(());
            }
        }
        Ok(())
    }

    fn check_due_date(&self, event: &Event, schedule_datetime: NaiveDateTime, result: &mut ValidationResult) {
        if schedule_datetime.date() >= event.due_datetime.date() {
            result.add_violation(
                ConstraintViolation::hard(
                    ConstraintType::DueDate,
                    format!("event must be scheduled before due date {}", event.due_datetime.date()),
                )
                .with_detail("due_date", event.due_datetime.date().to_string()),
            );
        }
    }

    pub async fn get_available_employees(
        &self,
        event: &Event,
        schedule_datetime: NaiveDateTime,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let mut available = Vec::new();
        for employee in self.repository.list_employees().await? {
            let validation = self
                .validate_assignment(event, &employee, schedule_datetime, None, &[])
                .await?;
            if validation.is_valid {
                available.push(employee);
            }
        }
        Ok(available)
    }

    pub async fn get_available_employee_ids(
        &self,
        event: &Event,
        schedule_datetime: NaiveDateTime,
    ) -> Result<Vec<crate::model::EmployeeId>, RepositoryError> {
        Ok(self
            .get_available_employees(event, schedule_datetime)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect())
    }
}
