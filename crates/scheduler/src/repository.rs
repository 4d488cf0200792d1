//! The abstract persistence contract (SPEC_FULL.md §6) and an in-memory reference
//! implementation over it, used by tests, the demo CLI, and as a template for a durable
//! adapter. Grounded on the workspace's wider use of `async-trait` for async interfaces and on
//! the teacher's habit of parameterizing domain functions over an executor trait
//! (`evento::Executor`) rather than a concrete store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::model::{
    CompanyHoliday, Employee, EmployeeId, Event, EventRef, ExistingSchedule, PendingAssignment,
    RotationAssignment, RotationException, SchedulerRun, TimeOff, WeeklyAvailability,
};

/// CRUD + the range/join access patterns the engine needs, expressed as bulk fetches that
/// callers filter in memory. A durable backend would push these filters into its queries;
/// the contract only promises the same *results*, not the same query shape.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_employees(&self) -> Result<Vec<Employee>, RepositoryError>;
    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError>;

    async fn list_events(&self) -> Result<Vec<Event>, RepositoryError>;
    async fn get_event(&self, event_ref: EventRef) -> Result<Option<Event>, RepositoryError>;
    async fn save_event(&self, event: Event) -> Result<(), RepositoryError>;

    async fn list_rotation_assignments(&self) -> Result<Vec<RotationAssignment>, RepositoryError>;
    async fn replace_rotation_assignments(
        &self,
        assignments: Vec<RotationAssignment>,
    ) -> Result<(), RepositoryError>;
    async fn upsert_rotation_assignment(
        &self,
        assignment: RotationAssignment,
    ) -> Result<(), RepositoryError>;

    async fn list_rotation_exceptions(&self) -> Result<Vec<RotationException>, RepositoryError>;
    async fn upsert_rotation_exception(
        &self,
        exception: RotationException,
    ) -> Result<RotationException, RepositoryError>;
    async fn delete_rotation_exception(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn list_time_off(&self) -> Result<Vec<TimeOff>, RepositoryError>;
    async fn list_weekly_availability(&self) -> Result<Vec<WeeklyAvailability>, RepositoryError>;
    async fn list_company_holidays(&self) -> Result<Vec<CompanyHoliday>, RepositoryError>;

    async fn list_existing_schedules(&self) -> Result<Vec<ExistingSchedule>, RepositoryError>;
    async fn save_existing_schedule(&self, schedule: ExistingSchedule) -> Result<(), RepositoryError>;
    async fn delete_existing_schedule(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn create_run(&self, run: SchedulerRun) -> Result<(), RepositoryError>;
    async fn save_run(&self, run: SchedulerRun) -> Result<(), RepositoryError>;
    async fn get_run(&self, id: Uuid) -> Result<Option<SchedulerRun>, RepositoryError>;
    async fn list_active_run_ids(&self) -> Result<Vec<Uuid>, RepositoryError>;

    async fn list_pending_assignments(&self, run_id: Uuid)
    -> Result<Vec<PendingAssignment>, RepositoryError>;
    async fn list_pending_assignments_for_runs(
        &self,
        run_ids: &[Uuid],
    ) -> Result<Vec<PendingAssignment>, RepositoryError>;
    async fn save_pending_assignment(
        &self,
        assignment: PendingAssignment,
    ) -> Result<(), RepositoryError>;
    async fn delete_pending_assignment(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Hook for notifying an external system that a committed schedule was bumped. SPEC_FULL.md
    /// §9 leaves the semantics undefined; the default is a no-op.
    async fn notify_bump(&self, _event_ref: EventRef) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Default)]
struct Store {
    employees: HashMap<EmployeeId, Employee>,
    events: HashMap<EventRef, Event>,
    rotation_assignments: Vec<RotationAssignment>,
    rotation_exceptions: HashMap<Uuid, RotationException>,
    time_off: Vec<TimeOff>,
    weekly_availability: Vec<WeeklyAvailability>,
    company_holidays: Vec<CompanyHoliday>,
    existing_schedules: HashMap<Uuid, ExistingSchedule>,
    runs: HashMap<Uuid, SchedulerRun>,
    pending_assignments: HashMap<Uuid, PendingAssignment>,
}

/// In-memory `Repository`. Cheap to clone: all state lives behind a shared `Arc<RwLock<_>>`,
/// so the same instance can be handed to the rotation manager, validator, conflict resolver,
/// and engine without synchronizing them through anything but the lock itself.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_employee(&self, employee: Employee) {
        self.store.write().await.employees.insert(employee.id, employee);
    }

    pub async fn seed_event(&self, event: Event) {
        self.store.write().await.events.insert(event.event_ref, event);
    }

    pub async fn seed_rotation_assignment(&self, assignment: RotationAssignment) {
        self.store.write().await.rotation_assignments.push(assignment);
    }

    pub async fn seed_time_off(&self, time_off: TimeOff) {
        self.store.write().await.time_off.push(time_off);
    }

    pub async fn seed_weekly_availability(&self, availability: WeeklyAvailability) {
        self.store.write().await.weekly_availability.push(availability);
    }

    pub async fn seed_company_holiday(&self, holiday: CompanyHoliday) {
        self.store.write().await.company_holidays.push(holiday);
    }

    pub async fn seed_existing_schedule(&self, schedule: ExistingSchedule) {
        self.store
            .write()
            .await
            .existing_schedules
            .insert(schedule.id, schedule);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_employees(&self) -> Result<Vec<Employee>, RepositoryError> {
        Ok(self.store.read().await.employees.values().cloned().collect())
    }

    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        Ok(self.store.read().await.employees.get(&id).cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>, RepositoryError> {
        Ok(self.store.read().await.events.values().cloned().collect())
    }

    async fn get_event(&self, event_ref: EventRef) -> Result<Option<Event>, RepositoryError> {
        Ok(self.store.read().await.events.get(&event_ref).cloned())
    }

    async fn save_event(&self, event: Event) -> Result<(), RepositoryError> {
        self.store.write().await.events.insert(event.event_ref, event);
        Ok(())
    }

    async fn list_rotation_assignments(&self) -> Result<Vec<RotationAssignment>, RepositoryError> {
        Ok(self.store.read().await.rotation_assignments.clone())
    }

    async fn replace_rotation_assignments(
        &self,
        assignments: Vec<RotationAssignment>,
    ) -> Result<(), RepositoryError> {
        self.store.write().await.rotation_assignments = assignments;
        Ok(())
    }

    async fn upsert_rotation_assignment(
        &self,
        assignment: RotationAssignment,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        if let Some(existing) = store.rotation_assignments.iter_mut().find(|a| {
            a.day_of_week == assignment.day_of_week && a.rotation_type == assignment.rotation_type
        }) {
            *existing = assignment;
        } else {
            store.rotation_assignments.push(assignment);
        }
        Ok(())
    }

    async fn list_rotation_exceptions(&self) -> Result<Vec<RotationException>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .rotation_exceptions
            .values()
            .cloned()
            .collect())
    }

    async fn upsert_rotation_exception(
        &self,
        mut exception: RotationException,
    ) -> Result<RotationException, RepositoryError> {
        let mut store = self.store.write().await;
        if let Some(existing) = store.rotation_exceptions.values().find(|e| {
            e.date == exception.date && e.rotation_type == exception.rotation_type
        }) {
            exception.id = existing.id;
        }
        store.rotation_exceptions.insert(exception.id, exception.clone());
        Ok(exception)
    }

    async fn delete_rotation_exception(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.store.write().await.rotation_exceptions.remove(&id).is_some())
    }

    async fn list_time_off(&self) -> Result<Vec<TimeOff>, RepositoryError> {
        Ok(self.store.read().await.time_off.clone())
    }

    async fn list_weekly_availability(&self) -> Result<Vec<WeeklyAvailability>, RepositoryError> {
        Ok(self.store.read().await.weekly_availability.clone())
    }

    async fn list_company_holidays(&self) -> Result<Vec<CompanyHoliday>, RepositoryError> {
        Ok(self.store.read().await.company_holidays.clone())
    }

    async fn list_existing_schedules(&self) -> Result<Vec<ExistingSchedule>, RepositoryError> {
        Ok(self.store.read().await.existing_schedules.values().cloned().collect())
    }

    async fn save_existing_schedule(&self, schedule: ExistingSchedule) -> Result<(), RepositoryError> {
        self.store
            .write()
            .await
            .existing_schedules
            .insert(schedule.id, schedule);
        Ok(())
    }

    async fn delete_existing_schedule(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.store.write().await.existing_schedules.remove(&id).is_some())
    }

    async fn create_run(&self, run: SchedulerRun) -> Result<(), RepositoryError> {
        self.store.write().await.runs.insert(run.id, run);
        Ok(())
    }

    async fn save_run(&self, run: SchedulerRun) -> Result<(), RepositoryError> {
        self.store.write().await.runs.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<SchedulerRun>, RepositoryError> {
        Ok(self.store.read().await.runs.get(&id).cloned())
    }

    async fn list_active_run_ids(&self) -> Result<Vec<Uuid>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .runs
            .values()
            .filter(|r| r.is_active())
            .map(|r| r.id)
            .collect())
    }

    async fn list_pending_assignments(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<PendingAssignment>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .pending_assignments
            .values()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn list_pending_assignments_for_runs(
        &self,
        run_ids: &[Uuid],
    ) -> Result<Vec<PendingAssignment>, RepositoryError> {
        Ok(self
            .store
            .read()
            .await
            .pending_assignments
            .values()
            .filter(|a| run_ids.contains(&a.run_id))
            .cloned()
            .collect())
    }

    async fn save_pending_assignment(
        &self,
        assignment: PendingAssignment,
    ) -> Result<(), RepositoryError> {
        self.store
            .write()
            .await
            .pending_assignments
            .insert(assignment.id, assignment);
        Ok(())
    }

    async fn delete_pending_assignment(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.store.write().await.pending_assignments.remove(&id).is_some())
    }
}
