// src/scheduling/conflict.rs

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Appointment, AppointmentStatus};
use crate::scheduling::availability::TimeSlot;
use crate::scheduling::interval::{TimeWindow, hhmm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Blocked,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub status: SlotStatus,
}

/// Booked/blocked counts for one provider-day.
///
/// `working_day` and `fully_booked` are kept apart: a day with no candidate
/// slots is not bookable, but it is never "fully booked".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayBookingSummary {
    pub total: usize,
    pub booked: usize,
    pub blocked: usize,
    pub available: usize,
    pub working_day: bool,
    pub fully_booked: bool,
}

impl DayBookingSummary {
    pub fn from_counts(total: usize, booked: usize, blocked: usize) -> Self {
        let taken = booked + blocked;
        Self {
            total,
            booked,
            blocked,
            available: total.saturating_sub(taken),
            working_day: total > 0,
            fully_booked: total > 0 && taken == total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<SlotView>,
    pub summary: DayBookingSummary,
    pub fully_booked: bool,
    pub working_day: bool,
}

#[cfg(test)]
impl DayAvailability {
    pub fn slot_at(&self, time: NaiveTime) -> Option<&SlotView> {
        self.slots.iter().find(|s| s.time == time)
    }
}

/// Annotates each candidate slot against the provider's reservations for the
/// day. Cancelled records are ignored. A slot overlapped by both a booking and
/// a block is reported as [`SchedulingError::DataInconsistency`].
pub fn resolve(
    provider_id: Uuid,
    date: NaiveDate,
    candidates: &[TimeSlot],
    reservations: &[Appointment],
) -> Result<DayAvailability, SchedulingError> {
    let overlapping = |window: &TimeWindow, status: AppointmentStatus| {
        reservations
            .iter()
            .any(|r| r.status == status && r.date == date && r.window.overlaps(window))
    };

    let mut slots = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let booked = overlapping(&candidate.window, AppointmentStatus::Booked);
        let blocked = overlapping(&candidate.window, AppointmentStatus::Blocked);

        let status = match (booked, blocked) {
            (true, true) => {
                return Err(SchedulingError::DataInconsistency {
                    provider_id,
                    date,
                    slot: candidate.window,
                });
            }
            (true, false) => SlotStatus::Booked,
            (false, true) => SlotStatus::Blocked,
            (false, false) => SlotStatus::Available,
        };

        slots.push(SlotView {
            time: candidate.window.start,
            end: candidate.window.end,
            status,
        });
    }

    let booked = slots.iter().filter(|s| s.status == SlotStatus::Booked).count();
    let blocked = slots.iter().filter(|s| s.status == SlotStatus::Blocked).count();
    let summary = DayBookingSummary::from_counts(slots.len(), booked, blocked);

    Ok(DayAvailability {
        provider_id,
        date,
        slots,
        fully_booked: summary.fully_booked,
        working_day: summary.working_day,
        summary,
    })
}

/// First active reservation overlapping `window`, if any.
pub fn first_overlap<'a>(reservations: &'a [Appointment], window: &TimeWindow) -> Option<&'a Appointment> {
    reservations
        .iter()
        .find(|r| r.status.is_active() && r.window.overlaps(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::availability::{candidate_slots, provider};
    use crate::scheduling::interval::{t, w};
    use chrono::Utc;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn reservation(provider_id: Uuid, window: TimeWindow, status: AppointmentStatus) -> Appointment {
        Appointment {
            appointment_id: Uuid::new_v4(),
            provider_id,
            date: monday(),
            window,
            status,
            room_id: None,
            patient_id: None,
            note: None,
            cancel_note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn booking_marks_only_its_slot() {
        let p = provider((9, 0), (17, 0), 30);
        let slots = candidate_slots(&p, monday()).unwrap();
        let existing = vec![reservation(p.provider_id, w(10, 0, 10, 30), AppointmentStatus::Booked)];

        let day = resolve(p.provider_id, monday(), &slots, &existing).unwrap();

        assert_eq!(day.slot_at(t(10, 0)).unwrap().status, SlotStatus::Booked);
        assert_eq!(day.slot_at(t(9, 30)).unwrap().status, SlotStatus::Available);
        assert_eq!(day.slot_at(t(10, 30)).unwrap().status, SlotStatus::Available);
        assert_eq!(day.summary.booked, 1);
        assert_eq!(day.summary.available, 15);
        assert!(!day.fully_booked);
    }

    #[test]
    fn off_grid_booking_takes_every_slot_it_touches() {
        let p = provider((9, 0), (12, 0), 30);
        let slots = candidate_slots(&p, monday()).unwrap();
        let existing = vec![reservation(p.provider_id, w(10, 15, 10, 45), AppointmentStatus::Booked)];

        let day = resolve(p.provider_id, monday(), &slots, &existing).unwrap();

        assert_eq!(day.slot_at(t(10, 0)).unwrap().status, SlotStatus::Booked);
        assert_eq!(day.slot_at(t(10, 30)).unwrap().status, SlotStatus::Booked);
        assert_eq!(day.slot_at(t(11, 0)).unwrap().status, SlotStatus::Available);
    }

    #[test]
    fn blocks_and_cancellations() {
        let p = provider((9, 0), (11, 0), 30);
        let slots = candidate_slots(&p, monday()).unwrap();
        let existing = vec![
            reservation(p.provider_id, w(9, 0, 10, 0), AppointmentStatus::Blocked),
            reservation(p.provider_id, w(10, 0, 10, 30), AppointmentStatus::Cancelled),
        ];

        let day = resolve(p.provider_id, monday(), &slots, &existing).unwrap();

        assert_eq!(day.slot_at(t(9, 0)).unwrap().status, SlotStatus::Blocked);
        assert_eq!(day.slot_at(t(9, 30)).unwrap().status, SlotStatus::Blocked);
        assert_eq!(day.slot_at(t(10, 0)).unwrap().status, SlotStatus::Available);
        assert_eq!(day.summary.blocked, 2);
    }

    #[test]
    fn booked_and_blocked_together_is_an_error() {
        let p = provider((9, 0), (11, 0), 30);
        let slots = candidate_slots(&p, monday()).unwrap();
        let existing = vec![
            reservation(p.provider_id, w(9, 30, 10, 0), AppointmentStatus::Booked),
            reservation(p.provider_id, w(9, 0, 10, 0), AppointmentStatus::Blocked),
        ];

        let err = resolve(p.provider_id, monday(), &slots, &existing).unwrap_err();
        match err {
            SchedulingError::DataInconsistency { slot, .. } => assert_eq!(slot, w(9, 30, 10, 0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fully_booked_requires_a_working_day() {
        let p = provider((9, 0), (10, 0), 30);
        let slots = candidate_slots(&p, monday()).unwrap();
        let existing = vec![
            reservation(p.provider_id, w(9, 0, 9, 30), AppointmentStatus::Booked),
            reservation(p.provider_id, w(9, 30, 10, 0), AppointmentStatus::Blocked),
        ];
        let day = resolve(p.provider_id, monday(), &slots, &existing).unwrap();
        assert!(day.fully_booked);
        assert!(day.working_day);

        let saturday = NaiveDate::from_ymd_opt(2026, 10, 24).unwrap();
        let none = candidate_slots(&p, saturday).unwrap();
        let day = resolve(p.provider_id, saturday, &none, &[]).unwrap();
        assert!(!day.fully_booked);
        assert!(!day.working_day);
        assert_eq!(day.summary, DayBookingSummary::from_counts(0, 0, 0));
    }

    #[test]
    fn slot_view_serializes_time_and_status() {
        let view = SlotView {
            time: t(9, 30),
            end: t(10, 0),
            status: SlotStatus::Available,
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({ "time": "09:30", "end": "10:00", "status": "available" })
        );
    }
}
