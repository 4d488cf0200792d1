//! Engine-level integration tests driving a full `run_auto_scheduler` pass against
//! `InMemoryRepository`, covering bump/forward-move/cap interactions that a single-function
//! unit test can't exercise end to end.

use chrono::{Datelike, NaiveDate, TimeDelta, Weekday};
use scheduler_core::{
    CompanyHoliday, Employee, Event, EventCondition, EventType, ExistingSchedule,
    InMemoryRepository, JobTitle, Repository, RotationType, RunType, SchedulerConfig,
    SchedulingEngine, WeeklyAvailability,
};
use uuid::Uuid;

fn employee(job_title: JobTitle) -> Employee {
    Employee {
        id: Uuid::new_v4(),
        name: format!("{job_title}"),
        job_title,
        is_active: true,
        juicer_trained: job_title == JobTitle::JuicerBarista,
    }
}

fn available_all_week(employee_id: Uuid) -> WeeklyAvailability {
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

/// Matches `SchedulingEngine`'s own notion of "today" under the default config's timezone.
fn engine_today() -> NaiveDate {
    chrono::Utc::now().with_timezone(&SchedulerConfig::default().timezone()).date_naive()
}

/// A Monday far enough out that it always sits beyond the default 3-day scheduling window,
/// regardless of when the test runs, and is never the reduced Sunday slot set.
fn next_monday_from(start: NaiveDate) -> NaiveDate {
    let mut d = start + TimeDelta::days(7);
    while d.weekday() != Weekday::Mon {
        d += TimeDelta::days(1);
    }
    d
}

fn core_event(event_ref: i64, name: &str, start: NaiveDate, due: NaiveDate, scheduled: bool) -> Event {
    Event {
        event_ref,
        name: name.to_string(),
        event_type: EventType::Core,
        start_datetime: start.and_hms_opt(0, 0, 0).unwrap(),
        due_datetime: due.and_hms_opt(0, 0, 0).unwrap(),
        estimated_duration_minutes: 30,
        condition: if scheduled { EventCondition::Staffed } else { EventCondition::Unstaffed },
        is_scheduled: scheduled,
    }
}

#[tokio::test]
async fn short_notice_core_bumps_a_later_due_core_at_today_plus_one() {
    let repo = InMemoryRepository::new();
    let today = engine_today();

    let bob = employee(JobTitle::LeadEventSpecialist);
    repo.seed_employee(bob.clone()).await;
    repo.seed_weekly_availability(available_all_week(bob.id)).await;

    // committed well before the contested day, with a due date far out — by due-date comparison
    // alone always a legal bump target.
    let less_urgent = core_event(1, "Demo 400001 Thing", today - TimeDelta::days(1), today + TimeDelta::days(10), true);
    repo.seed_event(less_urgent).await;
    repo.seed_existing_schedule(ExistingSchedule {
        id: Uuid::new_v4(),
        event_ref: 1,
        employee_id: bob.id,
        schedule_datetime: (today + TimeDelta::days(1)).and_hms_opt(10, 15, 0).unwrap(),
    })
    .await;

    // unscheduled, due in two days, so its only schedulable day sits inside the short-notice
    // window — an empty-slot search must never be attempted for it.
    let urgent = core_event(2, "Demo 400002 Thing", today + TimeDelta::days(1), today + TimeDelta::days(3), false);
    repo.seed_event(urgent).await;

    let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
    let run = engine.run_auto_scheduler(RunType::Automatic).await.unwrap();
    let assignments = repo.list_pending_assignments(run.id).await.unwrap();

    let urgent_assignment = assignments.iter().find(|a| a.event_ref == 2).unwrap();
    assert!(urgent_assignment.is_successful());
    assert_eq!(urgent_assignment.employee_id, Some(bob.id));
    assert_eq!(
        urgent_assignment.schedule_datetime.unwrap(),
        (today + TimeDelta::days(1)).and_hms_opt(10, 15, 0).unwrap()
    );
    assert!(urgent_assignment.is_swap);
    assert_eq!(urgent_assignment.bumped_event_ref, Some(1));

    // the bumped event is gone from the committed table at the contested day — it was deleted
    // and requeued rather than ever being offered a forward move or an empty slot elsewhere.
    assert!(
        repo.list_existing_schedules()
            .await
            .unwrap()
            .iter()
            .all(|s| !(s.event_ref == 1 && s.schedule_datetime.date() == today + TimeDelta::days(1)))
    );
}

#[tokio::test]
async fn urgent_core_bumps_a_later_due_core_without_forward_move() {
    let repo = InMemoryRepository::new();
    let today = engine_today();
    let anchor = next_monday_from(today);

    let bob = employee(JobTitle::LeadEventSpecialist);
    repo.seed_employee(bob.clone()).await;
    repo.seed_weekly_availability(available_all_week(bob.id)).await;

    // the only Lead on staff, so an empty-slot fill on the contested day is impossible once he's
    // already committed there — the incoming event has nowhere to go but through a bump.
    //
    // already committed, far from its own due date, and its own start date matches the
    // contested day exactly, so no earlier slot exists for a forward move.
    let less_urgent = core_event(1, "Demo 100001 Thing", anchor, anchor + TimeDelta::days(60), true);
    repo.seed_event(less_urgent).await;
    repo.seed_existing_schedule(ExistingSchedule {
        id: Uuid::new_v4(),
        event_ref: 1,
        employee_id: bob.id,
        schedule_datetime: anchor.and_hms_opt(10, 15, 0).unwrap(),
    })
    .await;

    // unscheduled, due soon, wants the same day the other event already holds.
    let urgent = core_event(2, "Demo 100002 Thing", anchor, anchor + TimeDelta::days(1), false);
    repo.seed_event(urgent).await;

    let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
    let run = engine.run_auto_scheduler(RunType::Automatic).await.unwrap();
    let assignments = repo.list_pending_assignments(run.id).await.unwrap();

    let urgent_assignment = assignments.iter().find(|a| a.event_ref == 2).unwrap();
    assert!(urgent_assignment.is_successful());
    assert_eq!(urgent_assignment.employee_id, Some(bob.id));
    assert_eq!(urgent_assignment.schedule_datetime.unwrap(), anchor.and_hms_opt(10, 15, 0).unwrap());
    assert!(urgent_assignment.is_swap);
    assert_eq!(urgent_assignment.bumped_event_ref, Some(1));

    // the bumped event was deleted from the committed table and requeued, landing on a later
    // day of its own rather than ever reusing the contested slot.
    assert!(repo.list_existing_schedules().await.unwrap().iter().all(|s| s.event_ref != 1));
    let requeued_assignment = assignments.iter().find(|a| a.event_ref == 1).unwrap();
    assert!(requeued_assignment.is_successful());
    assert!(!requeued_assignment.is_swap);
    assert!(requeued_assignment.schedule_datetime.unwrap().date() > anchor);
}

#[tokio::test]
async fn forward_move_preserves_employee_and_time_of_day() {
    let repo = InMemoryRepository::new();
    let today = engine_today();
    let anchor = next_monday_from(today);

    let bob = employee(JobTitle::LeadEventSpecialist);
    repo.seed_employee(bob.clone()).await;
    repo.seed_weekly_availability(available_all_week(bob.id)).await;

    // this time the committed event's own start date opens well before the contested day, so
    // an earlier date is available and a forward move is possible instead of an outright bump.
    let earlier_opening = anchor - TimeDelta::days(2);
    let less_urgent = core_event(1, "Demo 200001 Thing", earlier_opening, anchor + TimeDelta::days(60), true);
    repo.seed_event(less_urgent).await;
    repo.seed_existing_schedule(ExistingSchedule {
        id: Uuid::new_v4(),
        event_ref: 1,
        employee_id: bob.id,
        schedule_datetime: anchor.and_hms_opt(10, 15, 0).unwrap(),
    })
    .await;

    let urgent = core_event(2, "Demo 200002 Thing", anchor, anchor + TimeDelta::days(1), false);
    repo.seed_event(urgent).await;

    let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
    let run = engine.run_auto_scheduler(RunType::Automatic).await.unwrap();
    let assignments = repo.list_pending_assignments(run.id).await.unwrap();

    let urgent_assignment = assignments.iter().find(|a| a.event_ref == 2).unwrap();
    assert!(urgent_assignment.is_successful());
    assert_eq!(urgent_assignment.employee_id, Some(bob.id));
    assert_eq!(urgent_assignment.schedule_datetime.unwrap(), anchor.and_hms_opt(10, 15, 0).unwrap());
    assert!(urgent_assignment.is_swap);

    // the bumped event never produces a pending assignment of its own here — it moves in place
    // within the committed table, keeping the same employee and the same time of day.
    let schedules = repo.list_existing_schedules().await.unwrap();
    let moved = schedules.iter().find(|s| s.event_ref == 1).unwrap();
    assert_eq!(moved.employee_id, bob.id);
    assert_eq!(moved.schedule_datetime.time(), chrono::NaiveTime::from_hms_opt(10, 15, 0).unwrap());
    assert!(moved.schedule_datetime.date() < anchor);
    assert!(moved.schedule_datetime.date() >= earlier_opening);
    assert!(assignments.iter().all(|a| a.event_ref != 1));
}

#[tokio::test]
async fn exhausted_bump_budget_excludes_a_candidate_even_when_otherwise_eligible() {
    let repo = InMemoryRepository::new();
    let today = engine_today();
    let anchor = next_monday_from(today);

    let bob = employee(JobTitle::LeadEventSpecialist);
    repo.seed_employee(bob.clone()).await;
    repo.seed_weekly_availability(available_all_week(bob.id)).await;

    // committed far out from its own due date — by due-date comparison alone it is always a
    // legal bump target for the event below.
    let committed = core_event(1, "Demo 300001 Thing", anchor, anchor + TimeDelta::days(60), true);
    repo.seed_event(committed).await;
    repo.seed_existing_schedule(ExistingSchedule {
        id: Uuid::new_v4(),
        event_ref: 1,
        employee_id: bob.id,
        schedule_datetime: anchor.and_hms_opt(10, 15, 0).unwrap(),
    })
    .await;

    let urgent = core_event(2, "Demo 300002 Thing", anchor, anchor + TimeDelta::days(1), false);
    repo.seed_event(urgent).await;

    let config = SchedulerConfig { max_bumps_per_event: 0, ..SchedulerConfig::default() };
    let engine = SchedulingEngine::new(repo.clone(), config);
    let run = engine.run_auto_scheduler(RunType::Automatic).await.unwrap();
    let assignments = repo.list_pending_assignments(run.id).await.unwrap();

    // with no bump budget at all, the committed event is never a candidate, so the only Lead
    // on staff is unavailable for the contested day and the urgent event has to move on to the
    // next open day instead of swapping in.
    let urgent_assignment = assignments.iter().find(|a| a.event_ref == 2).unwrap();
    assert!(urgent_assignment.is_successful());
    assert!(!urgent_assignment.is_swap);
    assert!(urgent_assignment.schedule_datetime.unwrap().date() > anchor);

    // the committed event is completely untouched: still in the committed table, at its
    // original day and employee.
    let schedules = repo.list_existing_schedules().await.unwrap();
    let untouched = schedules.iter().find(|s| s.event_ref == 1).unwrap();
    assert_eq!(untouched.employee_id, bob.id);
    assert_eq!(untouched.schedule_datetime, anchor.and_hms_opt(10, 15, 0).unwrap());
}

#[tokio::test]
async fn holiday_and_rotation_untouched_events_round_trip_through_a_full_run() {
    let repo = InMemoryRepository::new();
    let today = engine_today();
    let anchor = next_monday_from(today);

    let carol = employee(JobTitle::ClubSupervisor);
    let dave = employee(JobTitle::JuicerBarista);
    repo.seed_employee(carol.clone()).await;
    repo.seed_employee(dave.clone()).await;
    repo.seed_weekly_availability(available_all_week(carol.id)).await;
    repo.seed_weekly_availability(available_all_week(dave.id)).await;
    repo.seed_rotation_assignment(scheduler_core::RotationAssignment {
        day_of_week: anchor.weekday().num_days_from_monday() as u8,
        rotation_type: RotationType::Juicer,
        primary_employee_id: dave.id,
        backup_employee_id: None,
    })
    .await;
    repo.seed_company_holiday(CompanyHoliday { date: anchor }).await;

    let juicer_event = Event {
        event_ref: 1,
        name: "Juicer Shift".into(),
        event_type: EventType::JuicerProduction,
        start_datetime: anchor.and_hms_opt(0, 0, 0).unwrap(),
        due_datetime: (anchor + TimeDelta::days(1)).and_hms_opt(0, 0, 0).unwrap(),
        estimated_duration_minutes: 60,
        condition: EventCondition::Unstaffed,
        is_scheduled: false,
    };
    repo.seed_event(juicer_event).await;

    let engine = SchedulingEngine::new(repo.clone(), SchedulerConfig::default());
    let run = engine.run_auto_scheduler(RunType::Automatic).await.unwrap();

    // the holiday leaves only one day in the juicer event's window, and that day is blocked,
    // so the run must fail the event rather than silently drop it.
    let assignments = repo.list_pending_assignments(run.id).await.unwrap();
    assert_eq!(assignments.len(), 1);
    let failure = &assignments[0];
    assert!(!failure.is_successful());
    assert_eq!(run.failed, 1);
    assert_eq!(run.scheduled, 0);

    let stored_run = repo.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored_run.id, run.id);
    assert_eq!(stored_run.failed, 1);
}
