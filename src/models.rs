use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduling::interval::{TimeWindow, hhmm};
use crate::scheduling::service::SchedulingService;
use crate::store::SessionDirectory;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulingService,
    pub sessions: Arc<dyn SessionDirectory>,
    /// Upper bound on a session lookup.
    pub store_timeout: Duration,
}

/* -------------------------
   Reference data (owned by admin data entry)
--------------------------*/

/// Inclusive range of day indices, `0 = Sunday .. 6 = Saturday`.
/// A range with `first > last` wraps over the weekend (Fri..Mon is `5..=1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDays {
    pub first: u8,
    pub last: u8,
}

impl WorkingDays {
    pub const MONDAY_TO_FRIDAY: WorkingDays = WorkingDays { first: 1, last: 5 };

    pub fn contains(&self, day: Weekday) -> bool {
        let idx = day.num_days_from_sunday() as u8;
        if self.first <= self.last {
            (self.first..=self.last).contains(&idx)
        } else {
            idx >= self.first || idx <= self.last
        }
    }
}

impl Default for WorkingDays {
    fn default() -> Self {
        WorkingDays::MONDAY_TO_FRIDAY
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub working_days: WorkingDays,
    #[serde(with = "hhmm")]
    pub day_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub day_end: NaiveTime,
    pub slot_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: Uuid,
    pub description: String,
}

/* -------------------------
   Reservations (owned by the scheduler)
--------------------------*/

/// Persisted appointment status. `available` only exists on derived slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AppointmentStatus {
    Booked = 1,
    Blocked = 2,
    Cancelled = 3,
}

impl AppointmentStatus {
    /// Booked and blocked records hold their window; cancelled ones don't.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Booked | AppointmentStatus::Blocked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Booked => "booked",
            AppointmentStatus::Blocked => "blocked",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub status: AppointmentStatus,
    pub room_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub note: Option<String>,
    pub cancel_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub status: AppointmentStatus,
    pub patient_id: Option<Uuid>,
    pub note: Option<String>,
}

/// Opaque booking payload supplied by the upstream booking flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPayload {
    pub patient_id: Option<Uuid>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub assignment_id: Uuid,
    pub room_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRoomAssignment {
    pub room_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub appointment_id: Option<Uuid>,
}

/// Which side of a room assignment a listing is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentScope {
    Room(Uuid),
    Provider(Uuid),
}

/* -------------------------
   Callers
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: i16,
}

/// Role mapping of the clinic user table:
/// 0 Patient, 1 Admin, 2 Manager, 3 Doctor, 4 Receptionist
pub fn role_to_string(role: i16) -> &'static str {
    match role {
        0 => "patient",
        1 => "admin",
        2 => "manager",
        3 => "doctor",
        4 => "receptionist",
        _ => "unknown",
    }
}
