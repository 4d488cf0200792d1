//! `run` and `show-run` subcommand implementations: load a seed file into an
//! [`InMemoryRepository`], invoke the engine, and persist the run's results as JSON so a later
//! `show-run` invocation (possibly in a different process) can display them.

use std::path::Path;

use anyhow::{Context, Result};
use scheduler_core::{
    CompanyHoliday, Employee, Event, ExistingSchedule, PendingAssignment, RotationAssignment,
    RotationException, SchedulerRun, TimeOff, WeeklyAvailability,
};
use scheduler_core::{InMemoryRepository, Repository, RunType, SchedulingEngine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The full input dataset for a single `run` invocation, loaded from a JSON seed file.
#[derive(Debug, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub rotation_assignments: Vec<RotationAssignment>,
    #[serde(default)]
    pub rotation_exceptions: Vec<RotationException>,
    #[serde(default)]
    pub time_off: Vec<TimeOff>,
    #[serde(default)]
    pub weekly_availability: Vec<WeeklyAvailability>,
    #[serde(default)]
    pub company_holidays: Vec<CompanyHoliday>,
    #[serde(default)]
    pub existing_schedules: Vec<ExistingSchedule>,
}

impl SeedData {
    async fn seed(self, repository: &InMemoryRepository) {
        for employee in self.employees {
            repository.seed_employee(employee).await;
        }
        for event in self.events {
            repository.seed_event(event).await;
        }
        for assignment in self.rotation_assignments {
            repository.seed_rotation_assignment(assignment).await;
        }
        for time_off in self.time_off {
            repository.seed_time_off(time_off).await;
        }
        for availability in self.weekly_availability {
            repository.seed_weekly_availability(availability).await;
        }
        for holiday in self.company_holidays {
            repository.seed_company_holiday(holiday).await;
        }
        for schedule in self.existing_schedules {
            repository.seed_existing_schedule(schedule).await;
        }
        // Rotation exceptions have no bulk seed helper; route them through the same upsert the
        // rotation manager itself would use, against a throwaway manager over the same store.
        if !self.rotation_exceptions.is_empty() {
            let rotation = scheduler_core::RotationManager::new(repository.clone());
            for exception in self.rotation_exceptions {
                let date = exception.date;
                let employee_id = exception.employee_id;
                if let Err(err) =
                    rotation.add_exception(date, exception.rotation_type, employee_id, exception.reason).await
                {
                    tracing::warn!(%date, %employee_id, error = %err, "skipping invalid rotation exception from seed file");
                }
            }
        }
    }
}

/// One completed run plus the assignments it produced, as persisted to the output file.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: SchedulerRun,
    pub assignments: Vec<PendingAssignment>,
}

fn read_records(path: &Path) -> Result<Vec<RunRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading output file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("parsing output file {}", path.display()))
}

fn write_records(path: &Path, records: &[RunRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("writing output file {}", path.display()))
}

pub async fn run(config: crate::config::Config, seed_path: String, output_path: String, manual: bool) -> Result<()> {
    let seed_raw = std::fs::read_to_string(&seed_path)
        .with_context(|| format!("reading seed file {seed_path}"))?;
    let seed: SeedData =
        serde_json::from_str(&seed_raw).with_context(|| format!("parsing seed file {seed_path}"))?;

    let repository = InMemoryRepository::new();
    seed.seed(&repository).await;

    let engine = SchedulingEngine::new(repository.clone(), config.scheduler);
    let run_type = if manual { RunType::Manual } else { RunType::Automatic };
    let run = engine.run_auto_scheduler(run_type).await?;
    let assignments = repository.list_pending_assignments(run.id).await?;

    tracing::info!(
        run_id = %run.id,
        scheduled = run.scheduled,
        failed = run.failed,
        requiring_swaps = run.requiring_swaps,
        "auto-scheduler run complete"
    );

    let output_path = Path::new(&output_path);
    let mut records = read_records(output_path)?;
    records.push(RunRecord { run, assignments });
    write_records(output_path, &records)?;

    Ok(())
}

pub async fn show_run(output_path: String, run_id: Uuid) -> Result<()> {
    let records = read_records(Path::new(&output_path))?;
    let Some(record) = records.into_iter().find(|r| r.run.id == run_id) else {
        tracing::error!(%run_id, "run not found in {output_path}");
        return Ok(());
    };

    println!(
        "run {} ({:?}, {:?}) — {} processed, {} scheduled, {} failed, {} requiring swaps",
        record.run.id,
        record.run.run_type,
        record.run.status,
        record.run.total_processed,
        record.run.scheduled,
        record.run.failed,
        record.run.requiring_swaps,
    );
    if let Some(error) = &record.run.error_message {
        println!("error: {error}");
    }

    for assignment in &record.assignments {
        let when: String = assignment
            .schedule_datetime
            .map(|dt| dt.to_string())
            .unwrap_or_else(|| "-".to_string());
        if assignment.is_successful() {
            println!(
                "  event {} -> employee {} at {}{}",
                assignment.event_ref,
                assignment.employee_id.map(|id| id.to_string()).unwrap_or_default(),
                when,
                if assignment.is_swap { " (swap)" } else { "" },
            );
        } else {
            println!(
                "  event {} FAILED: {}",
                assignment.event_ref,
                assignment.failure_reason.as_deref().unwrap_or("unknown reason"),
            );
        }
    }

    Ok(())
}
