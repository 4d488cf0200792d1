//! Data model for the scheduler: employees, events, rotations, and the records a run produces.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

pub type EmployeeId = Uuid;
pub type EventRef = i64;

/// Closed set of job titles. See SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum JobTitle {
    JuicerBarista,
    LeadEventSpecialist,
    EventSpecialist,
    ClubSupervisor,
}

/// Closed set of rotation roles a day can be resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum RotationType {
    Juicer,
    PrimaryLead,
}

/// Closed set of event types. `Digitals` subtype is not stored separately; it is recovered
/// from the event name via [`Event::digital_subtype`], mirroring the source's substring sniff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum EventType {
    Core,
    Supervisor,
    JuicerProduction,
    JuicerSurvey,
    JuicerDeepClean,
    Freeosk,
    Digitals,
    Other,
}

impl EventType {
    pub fn is_juicer(self) -> bool {
        matches!(
            self,
            EventType::JuicerProduction | EventType::JuicerSurvey | EventType::JuicerDeepClean
        )
    }

    /// Lead-only event types per the role matrix in SPEC_FULL.md §4.2.
    pub fn is_lead_only(self) -> bool {
        matches!(self, EventType::Freeosk | EventType::Digitals | EventType::Other)
    }

    /// Types the overlap check in the validator actually considers (§4.2 "Overlap computation").
    pub fn blocks_overlap(self) -> bool {
        matches!(self, EventType::Core | EventType::JuicerProduction)
    }
}

/// Digital event subtype, recovered from the event name (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalSubtype {
    Setup,
    Refresh,
    Teardown,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCondition {
    Unstaffed,
    Staffed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub job_title: JobTitle,
    pub is_active: bool,
    pub juicer_trained: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_ref: EventRef,
    pub name: String,
    pub event_type: EventType,
    pub start_datetime: NaiveDateTime,
    pub due_datetime: NaiveDateTime,
    pub estimated_duration_minutes: i64,
    pub condition: EventCondition,
    pub is_scheduled: bool,
}

/// Matches the first run of 6 decimal digits in an event name, per SPEC_FULL.md §6.
fn event_number_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\d{6}").expect("static pattern"))
}

impl Event {
    /// `start_datetime <= due_datetime` is a model invariant; constructed events must uphold it.
    pub fn new(
        event_ref: EventRef,
        name: impl Into<String>,
        event_type: EventType,
        start_datetime: NaiveDateTime,
        due_datetime: NaiveDateTime,
        estimated_duration_minutes: i64,
    ) -> Result<Self, crate::error::SchedulerError> {
        if start_datetime > due_datetime {
            return Err(crate::error::SchedulerError::InvalidEvent {
                event_ref,
                reason: "start_datetime is after due_datetime".into(),
            });
        }
        Ok(Event {
            event_ref,
            name: name.into(),
            event_type,
            start_datetime,
            due_datetime,
            estimated_duration_minutes,
            condition: EventCondition::Unstaffed,
            is_scheduled: false,
        })
    }

    /// `t` is a valid schedule datetime iff `start_datetime <= t < due_datetime`.
    pub fn accepts(&self, t: NaiveDateTime) -> bool {
        self.start_datetime <= t && t < self.due_datetime
    }

    pub fn digital_subtype(&self) -> DigitalSubtype {
        if self.event_type != EventType::Digitals {
            return DigitalSubtype::Unknown;
        }
        let lower = self.name.to_lowercase();
        if lower.contains("teardown") {
            DigitalSubtype::Teardown
        } else if lower.contains("refresh") {
            DigitalSubtype::Refresh
        } else if lower.contains("setup") {
            DigitalSubtype::Setup
        } else {
            DigitalSubtype::Unknown
        }
    }

    /// First 6-digit run embedded in the display name, used to pair Core and Supervisor events.
    pub fn event_number(&self) -> Option<&str> {
        event_number_regex().find(&self.name).map(|m| m.as_str())
    }

    /// Fixed priority table from SPEC_FULL.md §4.4.1.
    pub fn type_priority(&self) -> u8 {
        match self.event_type {
            EventType::JuicerProduction | EventType::JuicerSurvey | EventType::JuicerDeepClean => 1,
            EventType::Digitals => match self.digital_subtype() {
                DigitalSubtype::Setup => 2,
                DigitalSubtype::Refresh => 3,
                DigitalSubtype::Teardown => 5,
                DigitalSubtype::Unknown => 8,
            },
            EventType::Freeosk => 4,
            EventType::Core => 6,
            EventType::Supervisor => 7,
            EventType::Other => 9,
        }
    }
}

/// Weekly rotation assignment for one `(day_of_week, rotation_type)` pair. `day_of_week` is
/// 0-indexed with 0 = Monday, matching `chrono::Weekday::num_days_from_monday`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationAssignment {
    pub day_of_week: u8,
    pub rotation_type: RotationType,
    pub primary_employee_id: EmployeeId,
    pub backup_employee_id: Option<EmployeeId>,
}

impl RotationAssignment {
    pub fn weekday(&self) -> Option<Weekday> {
        Weekday::try_from(self.day_of_week).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationException {
    pub id: Uuid,
    pub date: NaiveDate,
    pub rotation_type: RotationType,
    pub employee_id: EmployeeId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOff {
    pub employee_id: EmployeeId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TimeOff {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub employee_id: EmployeeId,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl WeeklyAvailability {
    pub fn is_available(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompanyHoliday {
    pub date: NaiveDate,
}

/// A schedule already published to the external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingSchedule {
    pub id: Uuid,
    pub event_ref: EventRef,
    pub employee_id: EmployeeId,
    pub schedule_datetime: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunType {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerRun {
    pub id: Uuid,
    pub run_type: RunType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub total_processed: u32,
    pub scheduled: u32,
    pub failed: u32,
    pub requiring_swaps: u32,
    pub error_message: Option<String>,
}

impl SchedulerRun {
    pub fn new(run_type: RunType, started_at: DateTime<Utc>) -> Self {
        SchedulerRun {
            id: Uuid::new_v4(),
            run_type,
            started_at,
            completed_at: None,
            status: RunStatus::Running,
            approved_at: None,
            total_processed: 0,
            scheduled: 0,
            failed: 0,
            requiring_swaps: 0,
            error_message: None,
        }
    }

    /// Active runs are visible to the validator's cross-run coordination (§3, §5).
    pub fn is_active(&self) -> bool {
        self.approved_at.is_none()
            && matches!(self.status, RunStatus::Running | RunStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Proposed,
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAssignment {
    pub id: Uuid,
    pub run_id: Uuid,
    pub event_ref: EventRef,
    pub employee_id: Option<EmployeeId>,
    pub schedule_datetime: Option<NaiveDateTime>,
    pub status: AssignmentStatus,
    pub failure_reason: Option<String>,
    pub is_swap: bool,
    pub bumped_event_ref: Option<EventRef>,
    pub swap_reason: Option<String>,
}

impl PendingAssignment {
    pub fn scheduled(
        run_id: Uuid,
        event_ref: EventRef,
        employee_id: EmployeeId,
        schedule_datetime: NaiveDateTime,
    ) -> Self {
        PendingAssignment {
            id: Uuid::new_v4(),
            run_id,
            event_ref,
            employee_id: Some(employee_id),
            schedule_datetime: Some(schedule_datetime),
            status: AssignmentStatus::Proposed,
            failure_reason: None,
            is_swap: false,
            bumped_event_ref: None,
            swap_reason: None,
        }
    }

    pub fn failed(run_id: Uuid, event_ref: EventRef, reason: impl Into<String>) -> Self {
        PendingAssignment {
            id: Uuid::new_v4(),
            run_id,
            event_ref,
            employee_id: None,
            schedule_datetime: None,
            status: AssignmentStatus::Proposed,
            failure_reason: Some(reason.into()),
            is_swap: false,
            bumped_event_ref: None,
            swap_reason: None,
        }
    }

    pub fn with_swap(mut self, bumped_event_ref: EventRef, reason: impl Into<String>) -> Self {
        self.is_swap = true;
        self.bumped_event_ref = Some(bumped_event_ref);
        self.swap_reason = Some(reason.into());
        self
    }

    pub fn is_successful(&self) -> bool {
        self.failure_reason.is_none() && self.status == AssignmentStatus::Proposed
    }
}

/// Shared read capability over a committed [`ExistingSchedule`] or an in-flight
/// [`PendingAssignment`], so bump/forward-move logic is written once against either backing
/// store. See SPEC_FULL.md §3 "ScheduledLike (supplemental)" and §9's polymorphism note.
#[derive(Debug, Clone)]
pub enum ScheduledLike {
    Committed(ExistingSchedule),
    Pending(PendingAssignment),
}

impl ScheduledLike {
    pub fn event_ref(&self) -> EventRef {
        match self {
            ScheduledLike::Committed(s) => s.event_ref,
            ScheduledLike::Pending(p) => p.event_ref,
        }
    }

    pub fn employee_id(&self) -> Option<EmployeeId> {
        match self {
            ScheduledLike::Committed(s) => Some(s.employee_id),
            ScheduledLike::Pending(p) => p.employee_id,
        }
    }

    pub fn schedule_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            ScheduledLike::Committed(s) => Some(s.schedule_datetime),
            ScheduledLike::Pending(p) => p.schedule_datetime,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, ScheduledLike::Committed(_))
    }
}
