//! Wave orchestration: the part of the system that actually decides who works when.
//! Grounded on `scheduling_engine.py`'s live `run_auto_scheduler` path — Juicer bumping in
//! Wave 1, day-by-day bump-first Core scheduling with cascading bumps and forward-move
//! optimization in Wave 2, inline and orphaned Supervisor pairing, the fixed-time Waves 3-5,
//! and a rescue pass for urgent Core failures.

use std::collections::{HashMap, VecDeque};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::conflict::ConflictResolver;
use crate::error::SchedulerError;
use crate::model::{
    AssignmentStatus, DigitalSubtype, Employee, EmployeeId, Event, EventRef, EventType, JobTitle,
    PendingAssignment, RotationType, RunStatus, RunType, ScheduledLike, SchedulerRun,
};
use crate::repository::Repository;
use crate::rotation::RotationManager;
use crate::validator::ConstraintValidator;

/// Orders role-eligible candidates when a wave must pick among several. The crate ships exactly
/// one implementor; `rand` is intentionally absent from the dependency stack (§4.4.6).
pub trait EmployeeRanker: Send + Sync {
    fn rank(&self, candidates: &[Employee], event: &Event, datetime: NaiveDateTime) -> Vec<EmployeeId>;
}

/// Orders by the fixed role-priority table for the event's type, then by stable employee id —
/// reproducing the source's plain query-order behavior with no randomness.
pub struct DeterministicRanker;

impl DeterministicRanker {
    fn role_priority(event_type: EventType, job_title: JobTitle) -> u8 {
        use JobTitle::*;
        if event_type.is_juicer() {
            return match job_title {
                JuicerBarista => 0,
                ClubSupervisor => 1,
                _ => 9,
            };
        }
        match event_type {
            EventType::Core => match job_title {
                LeadEventSpecialist => 0,
                EventSpecialist => 1,
                JuicerBarista => 2,
                ClubSupervisor => 9,
            },
            EventType::Freeosk | EventType::Digitals => match job_title {
                LeadEventSpecialist => 0,
                ClubSupervisor => 1,
                _ => 9,
            },
            _ => match job_title {
                ClubSupervisor => 0,
                LeadEventSpecialist => 1,
                _ => 9,
            },
        }
    }
}

impl EmployeeRanker for DeterministicRanker {
    fn rank(&self, candidates: &[Employee], event: &Event, _datetime: NaiveDateTime) -> Vec<EmployeeId> {
        let mut ranked: Vec<&Employee> = candidates.iter().collect();
        ranked.sort_by_key(|e| (Self::role_priority(event.event_type, e.job_title), e.id));
        ranked.into_iter().map(|e| e.id).collect()
    }
}

/// Per-run bookkeeping that lives only for the duration of one `run_auto_scheduler` call
/// (§5 "Memoization"): how many times each event has been bumped, and the round-robin index
/// into the digital slot sets for each date.
#[derive(Default)]
struct RunContext {
    bump_count: HashMap<EventRef, u32>,
    digital_slot_index: HashMap<NaiveDate, usize>,
    teardown_slot_index: HashMap<NaiveDate, usize>,
}

enum CoreOutcome {
    ScheduledNoRequeue,
    ScheduledWithRequeue(Event),
    Unplaced,
}

fn earliest_schedulable_date(event: &Event, today: NaiveDate, scheduling_window_days: i64) -> NaiveDate {
    event.start_datetime.date().max(today + TimeDelta::days(scheduling_window_days))
}

pub struct SchedulingEngine<R: Repository + Clone> {
    repository: R,
    config: SchedulerConfig,
    rotation: RotationManager<R>,
    validator: ConstraintValidator<R>,
    conflict: ConflictResolver<R>,
    ranker: DeterministicRanker,
}

impl<R: Repository + Clone> SchedulingEngine<R> {
    pub fn new(repository: R, config: SchedulerConfig) -> Self {
        SchedulingEngine {
            rotation: RotationManager::new(repository.clone()),
            validator: ConstraintValidator::new(repository.clone(), config.clone()),
            conflict: ConflictResolver::new(repository.clone(), config.clone()),
            ranker: DeterministicRanker,
            repository,
            config,
        }
    }

    fn today(&self) -> NaiveDate {
        chrono::Utc::now().with_timezone(&self.config.timezone()).date_naive()
    }

    #[tracing::instrument(skip(self))]
    pub async fn run_auto_scheduler(&self, run_type: RunType) -> Result<SchedulerRun, SchedulerError> {
        let mut run = SchedulerRun::new(run_type, chrono::Utc::now());
        self.repository.create_run(run.clone()).await?;
        self.validator.set_current_run(run.id).await;

        let outcome = self.execute_waves(&mut run).await;
        run.completed_at = Some(chrono::Utc::now());

        match outcome {
            Ok(()) => {
                run.status = RunStatus::Completed;
                self.finalize_counters(&mut run).await?;
                self.repository.save_run(run.clone()).await?;
                tracing::info!(run_id = %run.id, scheduled = run.scheduled, failed = run.failed, "scheduler run completed");
                Ok(run)
            }
            Err(err) => {
                run.status = RunStatus::Failed;
                run.error_message = Some(err.to_string());
                self.repository.save_run(run.clone()).await?;
                tracing::error!(run_id = %run.id, error = %err, "scheduler run failed");
                Err(err)
            }
        }
    }

    async fn execute_waves(&self, run: &mut SchedulerRun) -> Result<(), SchedulerError> {
        let today = self.today();
        let mut ctx = RunContext::default();

        tracing::debug!(%today, "wave 1: juicer events");
        self.wave1_juicer(run, today).await?;

        tracing::debug!("wave 2: core events");
        self.wave2_core(run, &mut ctx, today).await?;

        tracing::debug!("orphaned supervisor pass");
        self.orphaned_supervisor_pass(run, today).await?;

        tracing::debug!("wave 3: freeosk events");
        self.wave3_freeosk(run, today).await?;

        tracing::debug!("wave 4: digital events");
        self.wave4_digitals(run, &mut ctx, today).await?;

        tracing::debug!("wave 5: other events");
        self.wave5_other(run, today).await?;

        tracing::debug!("rescue pass");
        self.rescue_pass(run, &mut ctx, today).await?;

        Ok(())
    }

    async fn finalize_counters(&self, run: &mut SchedulerRun) -> Result<(), SchedulerError> {
        let assignments = self.repository.list_pending_assignments(run.id).await?;
        run.total_processed = assignments.len() as u32;
        run.scheduled = assignments.iter().filter(|a| a.is_successful()).count() as u32;
        run.failed = assignments.iter().filter(|a| a.failure_reason.is_some()).count() as u32;
        run.requiring_swaps = assignments.iter().filter(|a| a.is_swap).count() as u32;
        Ok(())
    }

    /// Unscheduled, unstaffed, not-yet-overdue events, sorted ascending by `(days_until_due,
    /// type_priority)` per §4.4.1. Re-queried at the start of every wave so bumps from an
    /// earlier wave are immediately visible.
    async fn unscheduled_events(&self, today: NaiveDate) -> Result<Vec<Event>, SchedulerError> {
        let mut events: Vec<Event> = self
            .repository
            .list_events()
            .await?
            .into_iter()
            .filter(|e| !e.is_scheduled)
            .filter(|e| e.condition == crate::model::EventCondition::Unstaffed)
            .filter(|e| e.due_datetime.date() >= today)
            .collect();
        events.sort_by_key(|e| ((e.due_datetime.date() - today).num_days(), e.type_priority()));
        Ok(events)
    }

    async fn write_pending_assignment(
        &self,
        run: &SchedulerRun,
        event: &Event,
        employee_id: EmployeeId,
        schedule_datetime: NaiveDateTime,
        swap: Option<(EventRef, String)>,
    ) -> Result<(), SchedulerError> {
        if schedule_datetime < event.start_datetime || schedule_datetime >= event.due_datetime {
            tracing::error!(event_ref = event.event_ref, %schedule_datetime, "refusing to write assignment outside event window");
            return Err(SchedulerError::AssignmentOutsideWindow { event_ref: event.event_ref });
        }
        let mut assignment = PendingAssignment::scheduled(run.id, event.event_ref, employee_id, schedule_datetime);
        if let Some((bumped_ref, reason)) = swap {
            assignment = assignment.with_swap(bumped_ref, reason);
        }
        self.repository.save_pending_assignment(assignment).await?;
        Ok(())
    }

    async fn write_failed_assignment(
        &self,
        run: &SchedulerRun,
        event: &Event,
        reason: impl Into<String>,
    ) -> Result<(), SchedulerError> {
        self.repository
            .save_pending_assignment(PendingAssignment::failed(run.id, event.event_ref, reason))
            .await?;
        Ok(())
    }

    async fn is_day_available(&self, employee: &Employee, date: NaiveDate) -> Result<bool, SchedulerError> {
        let on_leave = self
            .repository
            .list_time_off()
            .await?
            .into_iter()
            .any(|t| t.employee_id == employee.id && t.covers(date));
        if on_leave {
            return Ok(false);
        }
        let weekday = date.weekday();
        let available = self
            .repository
            .list_weekly_availability()
            .await?
            .into_iter()
            .find(|a| a.employee_id == employee.id)
            .map(|a| a.is_available(weekday))
            .unwrap_or(true);
        Ok(available)
    }

    async fn day_available_employees(
        &self,
        job_titles: &[JobTitle],
        date: NaiveDate,
    ) -> Result<Vec<Employee>, SchedulerError> {
        let mut out = Vec::new();
        for employee in self.repository.list_employees().await? {
            if employee.is_active && job_titles.contains(&employee.job_title) && self.is_day_available(&employee, date).await? {
                out.push(employee);
            }
        }
        Ok(out)
    }

    /// Ranks day-available candidates of the given roles and returns the most preferred one,
    /// without checking overlap — used for Supervisor/Freeosk/Digitals/Other, which only ever
    /// check day-level availability (§4.4.2, §4.4.3).
    async fn best_available_for_role(
        &self,
        event: &Event,
        datetime: NaiveDateTime,
        job_titles: &[JobTitle],
    ) -> Result<Option<Employee>, SchedulerError> {
        let candidates = self.day_available_employees(job_titles, datetime.date()).await?;
        let ranked_ids = self.ranker.rank(&candidates, event, datetime);
        Ok(ranked_ids.into_iter().find_map(|id| candidates.iter().find(|e| e.id == id).cloned()))
    }

    async fn employee_has_juicer_event_on(&self, employee_id: EmployeeId, date: NaiveDate) -> Result<bool, SchedulerError> {
        let events = self.repository.list_events().await?;
        let committed = self
            .repository
            .list_existing_schedules()
            .await?
            .into_iter()
            .any(|s| {
                s.employee_id == employee_id
                    && s.schedule_datetime.date() == date
                    && events.iter().any(|e| e.event_ref == s.event_ref && e.event_type.is_juicer())
            });
        Ok(committed)
    }

    /// `event_ref` has neither a committed schedule nor a successful pending assignment in this
    /// run — i.e. it is still a candidate for scheduling or re-scheduling.
    async fn is_event_unresolved(&self, run_id: Uuid, event_ref: EventRef) -> Result<bool, SchedulerError> {
        if self.repository.list_existing_schedules().await?.iter().any(|s| s.event_ref == event_ref) {
            return Ok(false);
        }
        let has_pending_success = self
            .repository
            .list_pending_assignments(run_id)
            .await?
            .iter()
            .any(|a| a.event_ref == event_ref && a.failure_reason.is_none());
        Ok(!has_pending_success)
    }

    // ---- Wave 1: Juicer events -------------------------------------------------------------

    async fn wave1_juicer(&self, run: &SchedulerRun, today: NaiveDate) -> Result<(), SchedulerError> {
        let events: Vec<Event> = self
            .unscheduled_events(today)
            .await?
            .into_iter()
            .filter(|e| e.event_type.is_juicer())
            .collect();

        for event in events {
            if !self.try_schedule_juicer_event(run, &event, today).await? {
                self.write_failed_assignment(run, &event, "no rotation juicer available within the scheduling window")
                    .await?;
            }
        }
        Ok(())
    }

    async fn try_schedule_juicer_event(
        &self,
        run: &SchedulerRun,
        event: &Event,
        today: NaiveDate,
    ) -> Result<bool, SchedulerError> {
        let start = earliest_schedulable_date(event, today, self.config.scheduling_window_days);
        let due = event.due_datetime.date();
        let time = match event.event_type {
            EventType::JuicerSurvey => self.config.juicer_survey_time,
            _ => self.config.juicer_production_time,
        };

        let mut date = start;
        while date < due {
            let datetime = date.and_time(time);
            for try_backup in [false, true] {
                let Some(employee) = self
                    .rotation
                    .get_rotation_employee_with(date, RotationType::Juicer, try_backup)
                    .await?
                else {
                    continue;
                };

                let mut result = self
                    .validator
                    .validate_assignment(event, &employee, datetime, None, &[])
                    .await?;
                if !result.is_valid && result.blocked_only_by_bumpable() {
                    self.bump_core_events_for(run.id, employee.id, date).await?;
                    result = self
                        .validator
                        .validate_assignment(event, &employee, datetime, None, &[])
                        .await?;
                }
                if result.is_valid {
                    self.write_pending_assignment(run, event, employee.id, datetime, None).await?;
                    return Ok(true);
                }
            }
            date += TimeDelta::days(1);
        }
        Ok(false)
    }

    async fn core_schedules_for_employee_on(
        &self,
        run_id: Uuid,
        employee_id: EmployeeId,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledLike>, SchedulerError> {
        let events = self.repository.list_events().await?;
        let mut result = Vec::new();
        for s in self.repository.list_existing_schedules().await? {
            if s.employee_id == employee_id
                && s.schedule_datetime.date() == date
                && events.iter().any(|e| e.event_ref == s.event_ref && e.event_type == EventType::Core)
            {
                result.push(ScheduledLike::Committed(s));
            }
        }
        for a in self.repository.list_pending_assignments(run_id).await? {
            if a.employee_id != Some(employee_id) || a.failure_reason.is_some() || a.status == AssignmentStatus::Superseded {
                continue;
            }
            let Some(dt) = a.schedule_datetime else { continue };
            if dt.date() == date && events.iter().any(|e| e.event_ref == a.event_ref && e.event_type == EventType::Core) {
                result.push(ScheduledLike::Pending(a));
            }
        }
        Ok(result)
    }

    async fn bump_core_events_for(&self, run_id: Uuid, employee_id: EmployeeId, date: NaiveDate) -> Result<(), SchedulerError> {
        for item in self.core_schedules_for_employee_on(run_id, employee_id, date).await? {
            self.bump(item).await?;
        }
        Ok(())
    }

    async fn bump(&self, item: ScheduledLike) -> Result<EventRef, SchedulerError> {
        let event_ref = item.event_ref();
        match item {
            ScheduledLike::Committed(s) => {
                self.repository.delete_existing_schedule(s.id).await?;
                if let Some(mut event) = self.repository.get_event(s.event_ref).await? {
                    event.is_scheduled = false;
                    self.repository.save_event(event).await?;
                }
                self.repository.notify_bump(s.event_ref).await?;
            }
            ScheduledLike::Pending(a) => {
                self.repository.delete_pending_assignment(a.id).await?;
            }
        }
        Ok(event_ref)
    }

    // ---- Wave 2: Core events ----------------------------------------------------------------

    async fn wave2_core(&self, run: &SchedulerRun, ctx: &mut RunContext, today: NaiveDate) -> Result<(), SchedulerError> {
        let initial: VecDeque<Event> = self
            .unscheduled_events(today)
            .await?
            .into_iter()
            .filter(|e| e.event_type == EventType::Core)
            .collect();

        let budget = initial.len() * (self.config.max_bumps_per_event as usize + 2) + 1;
        let mut queue = initial;
        let mut iterations = 0usize;

        while let Some(event) = queue.pop_front() {
            iterations += 1;
            if iterations > budget {
                self.write_failed_assignment(run, &event, "exceeded scheduling attempt budget for this run").await?;
                continue;
            }

            match self.try_schedule_core_event(run, ctx, &event, today).await? {
                CoreOutcome::ScheduledNoRequeue => {}
                CoreOutcome::ScheduledWithRequeue(bumped) => {
                    queue.push_back(bumped);
                    let mut buf: Vec<Event> = queue.drain(..).collect();
                    buf.sort_by_key(|e| e.due_datetime);
                    queue = buf.into();
                }
                CoreOutcome::Unplaced => {
                    self.write_failed_assignment(run, &event, "no valid slot or bump target found before due date").await?;
                }
            }
        }
        Ok(())
    }

    async fn try_schedule_core_event(
        &self,
        run: &SchedulerRun,
        ctx: &mut RunContext,
        event: &Event,
        today: NaiveDate,
    ) -> Result<CoreOutcome, SchedulerError> {
        let start = event.start_datetime.date().max(today + TimeDelta::days(1));
        let due = event.due_datetime.date();

        let mut date = start;
        while date < due {
            let days_from_today = (date - today).num_days();

            if days_from_today > self.config.scheduling_window_days {
                if let Some(outcome) = self.try_fill_empty_slot(run, event, date).await? {
                    return Ok(outcome);
                }
            }
            if let Some(outcome) = self.try_bump_for_day(run, ctx, event, date, today).await? {
                return Ok(outcome);
            }
            date += TimeDelta::days(1);
        }
        Ok(CoreOutcome::Unplaced)
    }

    async fn core_schedule_times_on(&self, run_id: Uuid, date: NaiveDate) -> Result<Vec<NaiveTime>, SchedulerError> {
        let events = self.repository.list_events().await?;
        let mut times = Vec::new();
        for s in self.repository.list_existing_schedules().await? {
            if s.schedule_datetime.date() == date && events.iter().any(|e| e.event_ref == s.event_ref && e.event_type == EventType::Core) {
                times.push(s.schedule_datetime.time());
            }
        }
        for a in self.repository.list_pending_assignments(run_id).await? {
            if a.failure_reason.is_some() || a.status == AssignmentStatus::Superseded {
                continue;
            }
            if let Some(dt) = a.schedule_datetime {
                if dt.date() == date && events.iter().any(|e| e.event_ref == a.event_ref && e.event_type == EventType::Core) {
                    times.push(dt.time());
                }
            }
        }
        Ok(times)
    }

    async fn core_employee_pool(&self, event: &Event, datetime: NaiveDateTime) -> Result<Vec<EmployeeId>, SchedulerError> {
        let date = datetime.date();
        let mut candidates = Vec::new();
        for employee in self.repository.list_employees().await? {
            if !employee.is_active {
                continue;
            }
            match employee.job_title {
                JobTitle::LeadEventSpecialist | JobTitle::EventSpecialist => candidates.push(employee),
                JobTitle::JuicerBarista => {
                    if !self.employee_has_juicer_event_on(employee.id, date).await? {
                        candidates.push(employee);
                    }
                }
                JobTitle::ClubSupervisor => {}
            }
        }
        Ok(self.ranker.rank(&candidates, event, datetime))
    }

    /// Picks the Core slot with the fewest employees already scheduled on `date` and tries the
    /// priority-ordered employee pool against it. Disallowed inside the short-notice window
    /// (§4.4.2) — callers only call this once `days_from_today > SCHEDULING_WINDOW_DAYS`.
    async fn try_fill_empty_slot(&self, run: &SchedulerRun, event: &Event, date: NaiveDate) -> Result<Option<CoreOutcome>, SchedulerError> {
        let slots = self.config.core_slots_for(date.weekday());
        if slots.is_empty() {
            return Ok(None);
        }
        let occupied = self.core_schedule_times_on(run.id, date).await?;
        let (slot_index, _) = slots
            .iter()
            .enumerate()
            .map(|(i, t)| (i, occupied.iter().filter(|o| *o == t).count()))
            .min_by_key(|(_, count)| *count)
            .expect("slots is non-empty");
        let datetime = date.and_time(slots[slot_index]);

        for employee_id in self.core_employee_pool(event, datetime).await? {
            let Some(employee) = self.repository.get_employee(employee_id).await? else { continue };
            let result = self.validator.validate_assignment(event, &employee, datetime, None, &[]).await?;
            if result.is_valid {
                self.write_pending_assignment(run, event, employee.id, datetime, None).await?;
                self.pair_supervisor_inline(run, event, date).await?;
                return Ok(Some(CoreOutcome::ScheduledNoRequeue));
            }
        }
        Ok(None)
    }

    async fn find_bumpable_core_event(
        &self,
        run_id: Uuid,
        ctx: &RunContext,
        event: &Event,
        date: NaiveDate,
    ) -> Result<Option<ScheduledLike>, SchedulerError> {
        let events = self.repository.list_events().await?;
        let mut candidates: Vec<(ScheduledLike, NaiveDateTime)> = Vec::new();

        for (schedule, _score) in self.conflict.find_bumpable_events(date, None).await? {
            let Some(candidate_event) = events.iter().find(|e| e.event_ref == schedule.event_ref) else { continue };
            if candidate_event.event_type != EventType::Core || candidate_event.due_datetime <= event.due_datetime {
                continue;
            }
            if ctx.bump_count.get(&candidate_event.event_ref).copied().unwrap_or(0) >= self.config.max_bumps_per_event {
                continue;
            }
            let dt = schedule.schedule_datetime;
            candidates.push((ScheduledLike::Committed(schedule), dt));
        }

        for a in self.repository.list_pending_assignments(run_id).await? {
            if a.failure_reason.is_some() || a.status == AssignmentStatus::Superseded {
                continue;
            }
            let Some(dt) = a.schedule_datetime else { continue };
            if dt.date() != date {
                continue;
            }
            let Some(candidate_event) = events.iter().find(|e| e.event_ref == a.event_ref) else { continue };
            if candidate_event.event_type != EventType::Core || candidate_event.due_datetime <= event.due_datetime {
                continue;
            }
            if ctx.bump_count.get(&candidate_event.event_ref).copied().unwrap_or(0) >= self.config.max_bumps_per_event {
                continue;
            }
            candidates.push((ScheduledLike::Pending(a), dt));
        }

        candidates.sort_by(|(a_item, a_dt), (b_item, b_dt)| {
            let ea = events.iter().find(|e| e.event_ref == a_item.event_ref()).expect("candidate event exists");
            let eb = events.iter().find(|e| e.event_ref == b_item.event_ref()).expect("candidate event exists");
            eb.due_datetime.cmp(&ea.due_datetime).then(a_dt.cmp(b_dt))
        });

        Ok(candidates.into_iter().next().map(|(item, _)| item))
    }

    async fn try_forward_move(
        &self,
        bumped_event: &Event,
        bumped_employee_id: EmployeeId,
        original_time: NaiveTime,
        earliest: NaiveDate,
        latest_exclusive: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, SchedulerError> {
        let Some(employee) = self.repository.get_employee(bumped_employee_id).await? else {
            return Ok(None);
        };

        let mut date = earliest;
        while date < latest_exclusive {
            if employee.job_title == JobTitle::JuicerBarista && self.employee_has_juicer_event_on(employee.id, date).await? {
                date += TimeDelta::days(1);
                continue;
            }
            let datetime = date.and_time(original_time);
            let result = self
                .validator
                .validate_assignment(bumped_event, &employee, datetime, None, &[])
                .await?;
            if result.is_valid {
                return Ok(Some(datetime));
            }
            date += TimeDelta::days(1);
        }
        Ok(None)
    }

    async fn move_scheduled_like(&self, item: &ScheduledLike, new_datetime: NaiveDateTime) -> Result<(), SchedulerError> {
        match item {
            ScheduledLike::Committed(s) => {
                let mut updated = s.clone();
                updated.schedule_datetime = new_datetime;
                self.repository.save_existing_schedule(updated).await?;
            }
            ScheduledLike::Pending(a) => {
                let mut updated = a.clone();
                updated.schedule_datetime = Some(new_datetime);
                self.repository.save_pending_assignment(updated).await?;
            }
        }
        Ok(())
    }

    async fn find_paired_supervisor_schedule(
        &self,
        core_event: &Event,
        run_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<ScheduledLike>, SchedulerError> {
        let Some(number) = core_event.event_number().map(str::to_string) else {
            return Ok(None);
        };
        let events = self.repository.list_events().await?;
        let supervisor_refs: Vec<EventRef> = events
            .iter()
            .filter(|e| e.event_type == EventType::Supervisor && e.event_number() == Some(number.as_str()))
            .map(|e| e.event_ref)
            .collect();
        if supervisor_refs.is_empty() {
            return Ok(None);
        }

        for s in self.repository.list_existing_schedules().await? {
            if supervisor_refs.contains(&s.event_ref) && s.schedule_datetime.date() == date {
                return Ok(Some(ScheduledLike::Committed(s)));
            }
        }
        for a in self.repository.list_pending_assignments(run_id).await? {
            if supervisor_refs.contains(&a.event_ref) && a.failure_reason.is_none() {
                if let Some(dt) = a.schedule_datetime {
                    if dt.date() == date {
                        return Ok(Some(ScheduledLike::Pending(a)));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn move_paired_supervisor(
        &self,
        run_id: Uuid,
        core_event: &Event,
        old_date: NaiveDate,
        new_date: NaiveDate,
    ) -> Result<(), SchedulerError> {
        if let Some(item) = self.find_paired_supervisor_schedule(core_event, run_id, old_date).await? {
            let new_datetime = new_date.and_time(self.config.supervisor_time);
            self.move_scheduled_like(&item, new_datetime).await?;
        }
        Ok(())
    }

    async fn try_bump_for_day(
        &self,
        run: &SchedulerRun,
        ctx: &mut RunContext,
        event: &Event,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Option<CoreOutcome>, SchedulerError> {
        let Some(bumped) = self.find_bumpable_core_event(run.id, ctx, event, date).await? else {
            return Ok(None);
        };
        let Some(bumped_employee_id) = bumped.employee_id() else { return Ok(None) };
        let Some(bumped_datetime) = bumped.schedule_datetime() else { return Ok(None) };
        let bumped_time = bumped_datetime.time();
        let Some(bumped_event) = self.repository.get_event(bumped.event_ref()).await? else {
            return Ok(None);
        };

        let forward_start = bumped_event.start_datetime.date().max(today + TimeDelta::days(1));
        let moved = if forward_start < date {
            self.try_forward_move(&bumped_event, bumped_employee_id, bumped_time, forward_start, date).await?
        } else {
            None
        };

        let requeue = if let Some(new_datetime) = moved {
            self.move_scheduled_like(&bumped, new_datetime).await?;
            self.move_paired_supervisor(run.id, &bumped_event, date, new_datetime.date()).await?;
            None
        } else {
            self.bump(bumped).await?;
            *ctx.bump_count.entry(bumped_event.event_ref).or_insert(0) += 1;
            Some(bumped_event.clone())
        };

        let new_datetime = date.and_time(bumped_time);
        self.write_pending_assignment(
            run,
            event,
            bumped_employee_id,
            new_datetime,
            Some((bumped_event.event_ref, "bumped to make room for a higher-priority core event".into())),
        )
        .await?;
        self.pair_supervisor_inline(run, event, date).await?;

        Ok(Some(match requeue {
            Some(bumped_event) => CoreOutcome::ScheduledWithRequeue(bumped_event),
            None => CoreOutcome::ScheduledNoRequeue,
        }))
    }

    // ---- Supervisor pairing -------------------------------------------------------------------

    /// Immediately after a Core event is scheduled, look for its matching Supervisor event by
    /// 6-digit event number and schedule it at noon (§4.4.3).
    async fn pair_supervisor_inline(&self, run: &SchedulerRun, core_event: &Event, date: NaiveDate) -> Result<(), SchedulerError> {
        let Some(number) = core_event.event_number().map(str::to_string) else { return Ok(()) };

        let candidate = {
            let mut found = None;
            for event in self.repository.list_events().await? {
                if event.event_type == EventType::Supervisor && event.event_number() == Some(number.as_str()) {
                    if self.is_event_unresolved(run.id, event.event_ref).await? {
                        found = Some(event);
                        break;
                    }
                }
            }
            found
        };
        let Some(supervisor_event) = candidate else { return Ok(()) };

        let datetime = date.and_time(self.config.supervisor_time);
        if datetime < supervisor_event.start_datetime || datetime >= supervisor_event.due_datetime {
            return Ok(());
        }

        if let Some(employee) = self.best_available_for_role(&supervisor_event, datetime, &[JobTitle::ClubSupervisor]).await? {
            self.write_pending_assignment(run, &supervisor_event, employee.id, datetime, None).await?;
            return Ok(());
        }
        if let Some(primary_lead) = self.rotation.get_rotation_employee(date, RotationType::PrimaryLead).await? {
            if self.is_day_available(&primary_lead, date).await? {
                self.write_pending_assignment(run, &supervisor_event, primary_lead.id, datetime, None).await?;
                return Ok(());
            }
        }
        self.write_failed_assignment(run, &supervisor_event, "no supervisor or lead available to pair with core event")
            .await
    }

    async fn find_scheduled_core_date(&self, run_id: Uuid, number: &str) -> Result<Option<NaiveDate>, SchedulerError> {
        let events = self.repository.list_events().await?;
        let core_refs: Vec<EventRef> = events
            .iter()
            .filter(|e| e.event_type == EventType::Core && e.event_number().as_deref() == Some(number))
            .map(|e| e.event_ref)
            .collect();
        if core_refs.is_empty() {
            return Ok(None);
        }
        for s in self.repository.list_existing_schedules().await? {
            if core_refs.contains(&s.event_ref) {
                return Ok(Some(s.schedule_datetime.date()));
            }
        }
        for a in self.repository.list_pending_assignments(run_id).await? {
            if core_refs.contains(&a.event_ref) && a.failure_reason.is_none() {
                if let Some(dt) = a.schedule_datetime {
                    return Ok(Some(dt.date()));
                }
            }
        }
        Ok(None)
    }

    /// Supervisor events whose Core was scheduled without inline pairing — matched after the
    /// fact against both committed and current-run pending Core schedules (§4.4.2).
    async fn orphaned_supervisor_pass(&self, run: &SchedulerRun, today: NaiveDate) -> Result<(), SchedulerError> {
        let unscheduled_supervisors: Vec<Event> = self
            .unscheduled_events(today)
            .await?
            .into_iter()
            .filter(|e| e.event_type == EventType::Supervisor)
            .collect();

        for supervisor in unscheduled_supervisors {
            let Some(number) = supervisor.event_number().map(str::to_string) else { continue };
            let Some(core_date) = self.find_scheduled_core_date(run.id, &number).await? else { continue };
            let datetime = core_date.and_time(self.config.supervisor_time);
            if datetime < supervisor.start_datetime || datetime >= supervisor.due_datetime {
                continue;
            }

            if let Some(employee) = self.best_available_for_role(&supervisor, datetime, &[JobTitle::ClubSupervisor]).await? {
                self.write_pending_assignment(run, &supervisor, employee.id, datetime, None).await?;
                continue;
            }
            if let Some(primary_lead) = self.rotation.get_rotation_employee(core_date, RotationType::PrimaryLead).await? {
                if self.is_day_available(&primary_lead, core_date).await? {
                    self.write_pending_assignment(run, &supervisor, primary_lead.id, datetime, None).await?;
                    continue;
                }
            }
            self.write_failed_assignment(run, &supervisor, "no match found for orphaned supervisor event").await?;
        }
        Ok(())
    }

    // ---- Wave 3: Freeosk events ---------------------------------------------------------------

    async fn wave3_freeosk(&self, run: &SchedulerRun, today: NaiveDate) -> Result<(), SchedulerError> {
        let events: Vec<Event> = self
            .unscheduled_events(today)
            .await?
            .into_iter()
            .filter(|e| e.event_type == EventType::Freeosk)
            .collect();

        for event in events {
            let date = event.start_datetime.date();
            let datetime = date.and_time(self.config.freeosk_time);
            if datetime < event.start_datetime || datetime >= event.due_datetime {
                self.write_failed_assignment(run, &event, "freeosk start date falls outside the event's valid window")
                    .await?;
                continue;
            }

            if let Some(primary_lead) = self.rotation.get_rotation_employee(date, RotationType::PrimaryLead).await? {
                if self.is_day_available(&primary_lead, date).await? {
                    self.write_pending_assignment(run, &event, primary_lead.id, datetime, None).await?;
                    continue;
                }
            }
            if let Some(employee) = self
                .best_available_for_role(&event, datetime, &[JobTitle::LeadEventSpecialist, JobTitle::ClubSupervisor])
                .await?
            {
                self.write_pending_assignment(run, &event, employee.id, datetime, None).await?;
                continue;
            }
            self.write_failed_assignment(run, &event, "no lead or supervisor available for freeosk event").await?;
        }
        Ok(())
    }

    // ---- Wave 4: Digital events ---------------------------------------------------------------

    async fn wave4_digitals(&self, run: &SchedulerRun, ctx: &mut RunContext, today: NaiveDate) -> Result<(), SchedulerError> {
        let events: Vec<Event> = self
            .unscheduled_events(today)
            .await?
            .into_iter()
            .filter(|e| e.event_type == EventType::Digitals)
            .collect();

        for event in events {
            let date = event.start_datetime.date();
            let is_teardown = event.digital_subtype() == DigitalSubtype::Teardown;
            let slots = if is_teardown {
                &self.config.digital_teardown_slots
            } else {
                &self.config.digital_setup_refresh_slots
            };
            if slots.is_empty() {
                self.write_failed_assignment(run, &event, "no digital time slots configured").await?;
                continue;
            }
            let index_map = if is_teardown { &mut ctx.teardown_slot_index } else { &mut ctx.digital_slot_index };
            let idx = index_map.entry(date).or_insert(0);
            let time = slots[*idx % slots.len()];
            *idx += 1;
            let datetime = date.and_time(time);

            if datetime < event.start_datetime || datetime >= event.due_datetime {
                self.write_failed_assignment(run, &event, "digital events cannot move off their start date").await?;
                continue;
            }

            let rotation_lead = if is_teardown {
                self.rotation.get_secondary_lead(date).await?
            } else {
                self.rotation.get_rotation_employee(date, RotationType::PrimaryLead).await?
            };

            if let Some(lead) = rotation_lead {
                if self.is_day_available(&lead, date).await? {
                    self.write_pending_assignment(run, &event, lead.id, datetime, None).await?;
                    continue;
                }
            }
            if let Some(supervisor) = self.best_available_for_role(&event, datetime, &[JobTitle::ClubSupervisor]).await? {
                self.write_pending_assignment(run, &event, supervisor.id, datetime, None).await?;
                continue;
            }
            self.write_failed_assignment(run, &event, "no lead or supervisor available for digital event").await?;
        }
        Ok(())
    }

    // ---- Wave 5: Other events -----------------------------------------------------------------

    async fn wave5_other(&self, run: &SchedulerRun, today: NaiveDate) -> Result<(), SchedulerError> {
        let events: Vec<Event> = self
            .unscheduled_events(today)
            .await?
            .into_iter()
            .filter(|e| e.event_type == EventType::Other)
            .collect();

        for event in events {
            let date = event.start_datetime.date();
            let datetime = date.and_time(self.config.other_time);
            if datetime < event.start_datetime || datetime >= event.due_datetime {
                self.write_failed_assignment(run, &event, "other event start date falls outside its valid window")
                    .await?;
                continue;
            }
            if let Some(employee) = self
                .best_available_for_role(&event, datetime, &[JobTitle::ClubSupervisor, JobTitle::LeadEventSpecialist])
                .await?
            {
                self.write_pending_assignment(run, &event, employee.id, datetime, None).await?;
                continue;
            }
            self.write_failed_assignment(run, &event, "no supervisor or lead available for other event").await?;
        }
        Ok(())
    }

    // ---- Rescue pass ---------------------------------------------------------------------------

    async fn rescue_pass(&self, run: &SchedulerRun, ctx: &mut RunContext, today: NaiveDate) -> Result<(), SchedulerError> {
        let events = self.repository.list_events().await?;
        let mut failed: Vec<(PendingAssignment, Event)> = self
            .repository
            .list_pending_assignments(run.id)
            .await?
            .into_iter()
            .filter(|a| a.failure_reason.is_some())
            .filter_map(|a| {
                let event = events
                    .iter()
                    .find(|e| e.event_ref == a.event_ref && e.event_type == EventType::Core)?
                    .clone();
                let days_until_due = (event.due_datetime.date() - today).num_days();
                (days_until_due <= self.config.rescue_pass_urgent_days).then_some((a, event))
            })
            .collect();
        failed.sort_by_key(|(_, e)| e.due_datetime);

        for (failure, event) in failed {
            match self.try_schedule_core_event(run, ctx, &event, today).await? {
                CoreOutcome::ScheduledNoRequeue => {
                    self.repository.delete_pending_assignment(failure.id).await?;
                }
                CoreOutcome::ScheduledWithRequeue(bumped) => {
                    self.repository.delete_pending_assignment(failure.id).await?;
                    self.write_failed_assignment(run, &bumped, "bumped during rescue pass, not retried this run").await?;
                }
                CoreOutcome::Unplaced => {}
            }
        }
        Ok(())
    }

    // ---- Single-event manual scheduling (§4.4.4) -----------------------------------------------

    fn default_time_for(&self, event_type: EventType, subtype: DigitalSubtype) -> NaiveTime {
        match event_type {
            EventType::JuicerProduction | EventType::JuicerDeepClean => self.config.juicer_production_time,
            EventType::JuicerSurvey => self.config.juicer_survey_time,
            EventType::Freeosk => self.config.freeosk_time,
            EventType::Other => self.config.other_time,
            EventType::Supervisor => self.config.supervisor_time,
            EventType::Core => self.config.core_time_slots.first().copied().unwrap_or(self.config.supervisor_time),
            EventType::Digitals => match subtype {
                DigitalSubtype::Teardown => self.config.digital_teardown_slots.first().copied().unwrap_or(self.config.supervisor_time),
                _ => self.config.digital_setup_refresh_slots.first().copied().unwrap_or(self.config.supervisor_time),
            },
        }
    }

    fn role_priority_order(&self, event_type: EventType) -> Vec<JobTitle> {
        if event_type.is_juicer() {
            return vec![JobTitle::JuicerBarista, JobTitle::ClubSupervisor];
        }
        match event_type {
            EventType::Core => vec![JobTitle::LeadEventSpecialist, JobTitle::EventSpecialist, JobTitle::JuicerBarista],
            EventType::Supervisor => vec![JobTitle::ClubSupervisor, JobTitle::LeadEventSpecialist],
            EventType::Freeosk | EventType::Digitals => vec![JobTitle::LeadEventSpecialist, JobTitle::ClubSupervisor],
            EventType::Other => vec![JobTitle::ClubSupervisor, JobTitle::LeadEventSpecialist],
            _ => vec![],
        }
    }

    /// Simplified variant used for manual single-event scheduling suggestions: a default
    /// date/time, then the same role-priority order the waves use, returning the first
    /// validating match.
    pub async fn schedule_single_event(&self, event: &Event) -> Result<Option<(EmployeeId, NaiveDateTime)>, SchedulerError> {
        let today = self.today();
        let date = if event.event_type == EventType::Supervisor {
            match self.find_committed_core_date(event).await? {
                Some(d) => d,
                None => event.start_datetime.date().max(today),
            }
        } else {
            event.start_datetime.date().max(today)
        };

        let datetime = date.and_time(self.default_time_for(event.event_type, event.digital_subtype()));
        if datetime < event.start_datetime || datetime >= event.due_datetime {
            return Ok(None);
        }

        for title in self.role_priority_order(event.event_type) {
            let candidates = self.day_available_employees(&[title], date).await?;
            for id in self.ranker.rank(&candidates, event, datetime) {
                let Some(employee) = candidates.iter().find(|e| e.id == id) else { continue };
                let validation = self.validator.validate_assignment(event, employee, datetime, None, &[]).await?;
                if validation.is_valid {
                    return Ok(Some((employee.id, datetime)));
                }
            }
        }
        Ok(None)
    }

    async fn find_committed_core_date(&self, supervisor_event: &Event) -> Result<Option<NaiveDate>, SchedulerError> {
        let Some(number) = supervisor_event.event_number() else { return Ok(None) };
        let events = self.repository.list_events().await?;
        let core_refs: Vec<EventRef> = events
            .iter()
            .filter(|e| e.event_type == EventType::Core && e.event_number() == Some(number))
            .map(|e| e.event_ref)
            .collect();
        for s in self.repository.list_existing_schedules().await? {
            if core_refs.contains(&s.event_ref) {
                return Ok(Some(s.schedule_datetime.date()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompanyHoliday, EventCondition, ExistingSchedule, RotationAssignment, WeeklyAvailability};
    use crate::repository::InMemoryRepository;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn employee(job_title: JobTitle) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            name: format!("{job_title}"),
            job_title,
            is_active: true,
            juicer_trained: job_title == JobTitle::JuicerBarista,
        }
    }

    fn available_all_week(employee_id: EmployeeId) -> WeeklyAvailability {
        WeeklyAvailability {
            employee_id,
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: true,
        }
    }

    /// A Monday far enough in the future that the 3-day scheduling window never interferes.
    fn next_monday_from(start: NaiveDate) -> NaiveDate {
        let mut d = start + TimeDelta::days(7);
        while d.weekday() != chrono::Weekday::Mon {
            d += TimeDelta::days(1);
        }
        d
    }

    /// Matches `SchedulingEngine::today()` under the default config's timezone.
    fn engine_today() -> NaiveDate {
        chrono::Utc::now().with_timezone(&SchedulerConfig::default().timezone()).date_naive()
    }

    #[tokio::test]
    async fn juicer_event_bumps_existing_core_schedule() {
        let repo = InMemoryRepository::new();
        let today = engine_today();
        let monday = next_monday_from(today);

        let alice = employee(JobTitle::JuicerBarista);
        repo.seed_employee(alice.clone()).await;
        repo.seed_weekly_availability(available_all_week(alice.id)).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: 0,
            rotation_type: RotationType::Juicer,
            primary_employee_id: alice.id,
            backup_employee_id: None,
        })
        .await;

        let core_event = Event {
            event_ref: 1,
            name: "Core 000001".into(),
            event_type: EventType::Core,
            start_datetime: monday.and_hms_opt(0, 0, 0).unwrap(),
            due_datetime: (monday + TimeDelta::days(4)).and_hms_opt(0, 0, 0).unwrap(),
            estimated_duration_minutes: 30,
            condition: EventCondition::Staffed,
            is_scheduled: true,
        };
        repo.seed_event(core_event.clone()).await;
        repo.seed_existing_schedule(ExistingSchedule {
            id: Uuid::new_v4(),
            event_ref: 1,
            employee_id: alice.id,
            schedule_datetime: monday.and_hms_opt(10, 15, 0).unwrap(),
        })
        .await;

        let juicer_event = Event {
            event_ref: 2,
            name: "Juicer Shift".into(),
            event_type: EventType::JuicerProduction,
            start_datetime: monday.and_hms_opt(0, 0, 0).unwrap(),
            due_datetime: (monday + TimeDelta::days(3)).and_hms_opt(0, 0, 0).unwrap(),
            estimated_duration_minutes: 60,
            condition: EventCondition::Unstaffed,
            is_scheduled: false,
        };
        repo.seed_event(juicer_event).await;

        let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
        let run = engine.run_auto_scheduler(RunType::Manual).await.unwrap();

        let assignments = repo.list_pending_assignments(run.id).await.unwrap();
        let juicer_assignment = assignments.iter().find(|a| a.event_ref == 2).unwrap();
        assert!(juicer_assignment.is_successful());
        assert_eq!(juicer_assignment.schedule_datetime.unwrap(), monday.and_hms_opt(9, 0, 0).unwrap());

        // The bumped Core event's committed schedule should be gone and the event unscheduled.
        assert!(repo.list_existing_schedules().await.unwrap().iter().all(|s| s.event_ref != 1));
        let core_after = repo.get_event(1).await.unwrap().unwrap();
        assert!(!core_after.is_scheduled);
    }

    #[tokio::test]
    async fn supervisor_paired_to_core_by_event_number() {
        let repo = InMemoryRepository::new();
        let today = engine_today();
        let monday = next_monday_from(today);

        let lead = employee(JobTitle::LeadEventSpecialist);
        let supervisor_emp = employee(JobTitle::ClubSupervisor);
        repo.seed_employee(lead.clone()).await;
        repo.seed_employee(supervisor_emp.clone()).await;
        repo.seed_weekly_availability(available_all_week(lead.id)).await;
        repo.seed_weekly_availability(available_all_week(supervisor_emp.id)).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: 0,
            rotation_type: RotationType::PrimaryLead,
            primary_employee_id: lead.id,
            backup_employee_id: None,
        })
        .await;

        let core_event = Event {
            event_ref: 10,
            name: "Demo 123456 Thing".into(),
            event_type: EventType::Core,
            start_datetime: monday.and_hms_opt(0, 0, 0).unwrap(),
            due_datetime: (monday + TimeDelta::days(4)).and_hms_opt(0, 0, 0).unwrap(),
            estimated_duration_minutes: 30,
            condition: EventCondition::Unstaffed,
            is_scheduled: false,
        };
        let supervisor_event = Event {
            event_ref: 11,
            name: "Supervisor 123456 Check".into(),
            event_type: EventType::Supervisor,
            start_datetime: monday.and_hms_opt(0, 0, 0).unwrap(),
            due_datetime: (monday + TimeDelta::days(4)).and_hms_opt(0, 0, 0).unwrap(),
            estimated_duration_minutes: 5,
            condition: EventCondition::Unstaffed,
            is_scheduled: false,
        };
        repo.seed_event(core_event).await;
        repo.seed_event(supervisor_event).await;

        let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
        let run = engine.run_auto_scheduler(RunType::Manual).await.unwrap();

        let assignments = repo.list_pending_assignments(run.id).await.unwrap();
        let supervisor_assignment = assignments.iter().find(|a| a.event_ref == 11).unwrap();
        assert!(supervisor_assignment.is_successful());
        assert_eq!(supervisor_assignment.employee_id, Some(supervisor_emp.id));
        assert_eq!(supervisor_assignment.schedule_datetime.unwrap().time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn holiday_blocks_juicer_wave_with_descriptive_failure() {
        let repo = InMemoryRepository::new();
        let today = engine_today();
        let monday = next_monday_from(today);
        let tuesday = monday + TimeDelta::days(1);

        let alice = employee(JobTitle::JuicerBarista);
        repo.seed_employee(alice.clone()).await;
        repo.seed_weekly_availability(available_all_week(alice.id)).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: tuesday.weekday().num_days_from_monday() as u8,
            rotation_type: RotationType::Juicer,
            primary_employee_id: alice.id,
            backup_employee_id: None,
        })
        .await;
        repo.seed_company_holiday(CompanyHoliday { date: tuesday }).await;

        let juicer_event = Event {
            event_ref: 1,
            name: "Juicer Shift".into(),
            event_type: EventType::JuicerProduction,
            start_datetime: monday.and_hms_opt(0, 0, 0).unwrap(),
            due_datetime: (tuesday + TimeDelta::days(1)).and_hms_opt(0, 0, 0).unwrap(),
            estimated_duration_minutes: 60,
            condition: EventCondition::Unstaffed,
            is_scheduled: false,
        };
        repo.seed_event(juicer_event).await;

        let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
        let run = engine.run_auto_scheduler(RunType::Manual).await.unwrap();

        let assignments = repo.list_pending_assignments(run.id).await.unwrap();
        let failure = assignments.iter().find(|a| a.event_ref == 1).unwrap();
        assert!(!failure.is_successful());
    }
}
