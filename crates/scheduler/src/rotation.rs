//! Rotation lookups and CRUD, grounded on `rotation_manager.py`: exception-first lookup,
//! fixed day-of-week assignment as fallback, and a primary/backup pair per assignment.

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::error::RotationError;
use crate::model::{Employee, EmployeeId, JobTitle, RotationAssignment, RotationException, RotationType};
use crate::repository::Repository;

pub struct RotationManager<R: Repository> {
    repository: R,
}

impl<R: Repository> RotationManager<R> {
    pub fn new(repository: R) -> Self {
        RotationManager { repository }
    }

    /// Employee assigned for `date`/`rotation_type`: an exception for that exact date wins,
    /// otherwise the weekly assignment for that weekday applies.
    pub async fn get_rotation_employee(
        &self,
        date: NaiveDate,
        rotation_type: RotationType,
    ) -> Result<Option<Employee>, RotationError> {
        self.get_rotation_employee_with(date, rotation_type, false).await
    }

    /// Same lookup, but when `try_backup` is true and the resolved assignment has a configured
    /// backup employee, the backup is returned instead of the primary.
    pub async fn get_rotation_employee_with(
        &self,
        date: NaiveDate,
        rotation_type: RotationType,
        try_backup: bool,
    ) -> Result<Option<Employee>, RotationError> {
        if let Some(exception) = self.find_exception(date, rotation_type).await? {
            return self.employee(exception.employee_id).await.map(Some);
        }

        let Some(assignment) = self.find_weekly_assignment(date, rotation_type).await? else {
            return Ok(None);
        };

        let employee_id = if try_backup {
            assignment.backup_employee_id.unwrap_or(assignment.primary_employee_id)
        } else {
            assignment.primary_employee_id
        };
        self.employee(employee_id).await.map(Some)
    }

    /// Resolves both the primary and backup employee for a date/rotation in one lookup. An
    /// exception for the date has no backup concept, so it is returned as `(employee, None)`.
    pub async fn get_rotation_with_backup(
        &self,
        date: NaiveDate,
        rotation_type: RotationType,
    ) -> Result<(Option<Employee>, Option<Employee>), RotationError> {
        if let Some(exception) = self.find_exception(date, rotation_type).await? {
            let employee = self.employee(exception.employee_id).await?;
            return Ok((Some(employee), None));
        }

        let Some(assignment) = self.find_weekly_assignment(date, rotation_type).await? else {
            return Ok((None, None));
        };

        let primary = self.employee(assignment.primary_employee_id).await?;
        let backup = match assignment.backup_employee_id {
            Some(id) => Some(self.employee(id).await?),
            None => None,
        };
        Ok((Some(primary), backup))
    }

    /// Creates or replaces the weekly assignment for a `(day_of_week, rotation_type)` pair.
    pub async fn set_rotation(
        &self,
        day_of_week: u8,
        rotation_type: RotationType,
        primary_employee_id: EmployeeId,
        backup_employee_id: Option<EmployeeId>,
    ) -> Result<(), RotationError> {
        if day_of_week > 6 {
            return Err(RotationError::InvalidDayOfWeek(day_of_week));
        }
        self.require_employee(primary_employee_id).await?;
        if let Some(backup_id) = backup_employee_id {
            self.require_employee(backup_id).await?;
        }

        self.repository
            .upsert_rotation_assignment(RotationAssignment {
                day_of_week,
                rotation_type,
                primary_employee_id,
                backup_employee_id,
            })
            .await?;
        Ok(())
    }

    /// Replaces the entire weekly rotation table. Fails atomically: validates every entry first
    /// and, if any are invalid, writes nothing and returns all of their errors together.
    pub async fn set_all_rotations(
        &self,
        assignments: Vec<RotationAssignment>,
    ) -> Result<(), RotationError> {
        let mut errors = Vec::new();
        for assignment in &assignments {
            if assignment.day_of_week > 6 {
                errors.push(RotationError::InvalidDayOfWeek(assignment.day_of_week));
                continue;
            }
            if let Err(e) = self.require_employee(assignment.primary_employee_id).await {
                errors.push(e);
            }
            if let Some(backup_id) = assignment.backup_employee_id {
                if let Err(e) = self.require_employee(backup_id).await {
                    errors.push(e);
                }
            }
        }
        if !errors.is_empty() {
            return Err(RotationError::Multiple(errors));
        }
        self.repository.replace_rotation_assignments(assignments).await?;
        Ok(())
    }

    pub async fn add_exception(
        &self,
        date: NaiveDate,
        rotation_type: RotationType,
        employee_id: EmployeeId,
        reason: Option<String>,
    ) -> Result<RotationException, RotationError> {
        self.require_employee(employee_id).await?;
        let exception = self
            .repository
            .upsert_rotation_exception(RotationException {
                id: Uuid::new_v4(),
                date,
                rotation_type,
                employee_id,
                reason,
            })
            .await?;
        Ok(exception)
    }

    pub async fn get_exceptions(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RotationException>, RotationError> {
        Ok(self
            .repository
            .list_rotation_exceptions()
            .await?
            .into_iter()
            .filter(|e| e.date >= start_date && e.date <= end_date)
            .collect())
    }

    pub async fn delete_exception(&self, id: Uuid) -> Result<bool, RotationError> {
        if !self.repository.delete_rotation_exception(id).await? {
            return Err(RotationError::UnknownException(id));
        }
        Ok(true)
    }

    /// Any active Lead Event Specialist or Club Supervisor who is not the primary lead for
    /// `date`, used to staff a second lead-eligible role (§4.1).
    pub async fn get_secondary_lead(&self, date: NaiveDate) -> Result<Option<Employee>, RotationError> {
        let primary_lead_id = self
            .get_rotation_employee(date, RotationType::PrimaryLead)
            .await?
            .map(|e| e.id);

        let candidate = self
            .repository
            .list_employees()
            .await?
            .into_iter()
            .filter(|e| e.is_active)
            .filter(|e| matches!(e.job_title, JobTitle::LeadEventSpecialist | JobTitle::ClubSupervisor))
            .find(|e| Some(e.id) != primary_lead_id);

        Ok(candidate)
    }

    async fn find_exception(
        &self,
        date: NaiveDate,
        rotation_type: RotationType,
    ) -> Result<Option<RotationException>, RotationError> {
        Ok(self
            .repository
            .list_rotation_exceptions()
            .await?
            .into_iter()
            .find(|e| e.date == date && e.rotation_type == rotation_type))
    }

    async fn find_weekly_assignment(
        &self,
        date: NaiveDate,
        rotation_type: RotationType,
    ) -> Result<Option<RotationAssignment>, RotationError> {
        let day_of_week = date.weekday().num_days_from_monday() as u8;
        Ok(self
            .repository
            .list_rotation_assignments()
            .await?
            .into_iter()
            .find(|a| a.day_of_week == day_of_week && a.rotation_type == rotation_type))
    }

    async fn employee(&self, id: EmployeeId) -> Result<Employee, RotationError> {
        self.repository
            .get_employee(id)
            .await?
            .ok_or(RotationError::UnknownEmployee(id))
    }

    async fn require_employee(&self, id: EmployeeId) -> Result<(), RotationError> {
        self.employee(id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    fn employee(job_title: JobTitle) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            name: "Test".into(),
            job_title,
            is_active: true,
            juicer_trained: true,
        }
    }

    #[tokio::test]
    async fn backup_is_returned_only_when_requested() {
        let repo = InMemoryRepository::new();
        let primary = employee(JobTitle::JuicerBarista);
        let backup = employee(JobTitle::JuicerBarista);
        repo.seed_employee(primary.clone()).await;
        repo.seed_employee(backup.clone()).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: 0,
            rotation_type: RotationType::Juicer,
            primary_employee_id: primary.id,
            backup_employee_id: Some(backup.id),
        })
        .await;

        let manager = RotationManager::new(repo);
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

        let resolved_primary = manager
            .get_rotation_employee_with(monday, RotationType::Juicer, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved_primary.id, primary.id);

        let resolved_backup = manager
            .get_rotation_employee_with(monday, RotationType::Juicer, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved_backup.id, backup.id);
    }

    #[tokio::test]
    async fn falls_back_to_primary_when_no_backup_configured() {
        let repo = InMemoryRepository::new();
        let primary = employee(JobTitle::JuicerBarista);
        repo.seed_employee(primary.clone()).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: 0,
            rotation_type: RotationType::Juicer,
            primary_employee_id: primary.id,
            backup_employee_id: None,
        })
        .await;

        let manager = RotationManager::new(repo);
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

        let resolved = manager
            .get_rotation_employee_with(monday, RotationType::Juicer, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, primary.id);
    }

    #[tokio::test]
    async fn exception_overrides_weekly_assignment() {
        let repo = InMemoryRepository::new();
        let weekly = employee(JobTitle::JuicerBarista);
        let exception_employee = employee(JobTitle::JuicerBarista);
        repo.seed_employee(weekly.clone()).await;
        repo.seed_employee(exception_employee.clone()).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: 0,
            rotation_type: RotationType::Juicer,
            primary_employee_id: weekly.id,
            backup_employee_id: None,
        })
        .await;

        let manager = RotationManager::new(repo);
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        manager
            .add_exception(monday, RotationType::Juicer, exception_employee.id, None)
            .await
            .unwrap();

        let resolved = manager
            .get_rotation_employee(monday, RotationType::Juicer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, exception_employee.id);
    }

    #[tokio::test]
    async fn secondary_lead_excludes_primary() {
        let repo = InMemoryRepository::new();
        let primary = employee(JobTitle::LeadEventSpecialist);
        let other_lead = employee(JobTitle::LeadEventSpecialist);
        repo.seed_employee(primary.clone()).await;
        repo.seed_employee(other_lead.clone()).await;
        repo.seed_rotation_assignment(RotationAssignment {
            day_of_week: 1,
            rotation_type: RotationType::PrimaryLead,
            primary_employee_id: primary.id,
            backup_employee_id: None,
        })
        .await;

        let manager = RotationManager::new(repo);
        let tuesday = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
        let secondary = manager.get_secondary_lead(tuesday).await.unwrap().unwrap();
        assert_eq!(secondary.id, other_lead.id);
    }

    #[tokio::test]
    async fn set_rotation_rejects_unknown_employee() {
        let repo = InMemoryRepository::new();
        let manager = RotationManager::new(repo);
        let result = manager
            .set_rotation(0, RotationType::Juicer, Uuid::new_v4(), None)
            .await;
        assert!(matches!(result, Err(RotationError::UnknownEmployee(_))));
    }
}
