// src/scheduling/service.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{
    Appointment, AppointmentStatus, AssignmentScope, NewAppointment, PatientPayload, Provider, RoomAssignment,
};
use crate::scheduling::Reservations;
use crate::scheduling::allocator::{AssignRoom, RoomAllocator};
use crate::scheduling::availability::candidate_slots;
use crate::scheduling::calendar::{MonthGrid, build_month, month_bounds};
use crate::scheduling::cancellation::{CancelResult, CancellationCoordinator, CancellationOutcome};
use crate::scheduling::conflict::{DayAvailability, DayBookingSummary, first_overlap, resolve};
use crate::scheduling::interval::TimeWindow;
use crate::scheduling::locks::{ScheduleKey, ScheduleLocks};
use crate::store::{Overlap, ReservationStore, StoreError};

#[derive(Debug, Clone)]
pub struct BookSlot {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub patient: PatientPayload,
    pub room_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct BlockSlot {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub note: Option<String>,
}

/// Entry point for every scheduling operation. Cheap to clone; all clones
/// share one store handle and one lock table.
#[derive(Clone)]
pub struct SchedulingService {
    reservations: Reservations,
    locks: ScheduleLocks,
    allocator: RoomAllocator,
    cancellations: CancellationCoordinator,
}

impl SchedulingService {
    pub fn new(store: Arc<dyn ReservationStore>, timeout: Duration) -> Self {
        let reservations = Reservations::new(store, timeout);
        let locks = ScheduleLocks::new();
        let allocator = RoomAllocator::new(reservations.clone(), locks.clone());
        let cancellations = CancellationCoordinator::new(reservations.clone(), allocator.clone());
        Self {
            reservations,
            locks,
            allocator,
            cancellations,
        }
    }

    async fn day_for(&self, provider: &Provider, date: NaiveDate) -> Result<DayAvailability, SchedulingError> {
        let candidates = candidate_slots(provider, date)?;
        let db = &self.reservations;
        let existing = db.call(db.store().list_appointments(provider.provider_id, date)).await?;
        resolve(provider.provider_id, date, &candidates, &existing)
    }

    /// A provider holding a room is busy for that window, whether or not an
    /// appointment sits inside it. Callers hold the provider-day key.
    async fn ensure_no_room_hold(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        window: &TimeWindow,
    ) -> Result<(), SchedulingError> {
        let db = &self.reservations;
        let holds = db
            .call(db.store().list_room_assignments(AssignmentScope::Provider(provider_id), date))
            .await?;
        match holds.iter().find(|a| a.window.overlaps(window)) {
            Some(hold) => Err(SchedulingError::ProviderConflict {
                provider_id,
                date,
                existing: hold.window,
            }),
            None => Ok(()),
        }
    }

    pub async fn get_availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<DayAvailability, SchedulingError> {
        let provider = self.reservations.require_provider(provider_id).await?;
        self.day_for(&provider, date).await
    }

    pub async fn calendar_month(&self, provider_id: Uuid, year: i32, month: u32) -> Result<MonthGrid, SchedulingError> {
        let (first, last) = month_bounds(year, month)?;
        let provider = self.reservations.require_provider(provider_id).await?;

        let mut summaries: HashMap<NaiveDate, DayBookingSummary> = HashMap::new();
        let mut inconsistent = HashSet::new();
        for date in first.iter_days().take_while(|d| *d <= last) {
            match self.day_for(&provider, date).await {
                Ok(day) => {
                    summaries.insert(date, day.summary);
                }
                // one bad day must not hide the rest of the month
                Err(SchedulingError::DataInconsistency { slot, .. }) => {
                    tracing::error!(%provider_id, %date, %slot, "booked and blocked reservations overlap");
                    inconsistent.insert(date);
                }
                Err(e) => return Err(e),
            }
        }

        build_month(year, month, &summaries, &inconsistent)
    }

    pub async fn book_slot(&self, req: BookSlot) -> Result<Appointment, SchedulingError> {
        let provider = self.reservations.require_provider(req.provider_id).await?;
        let slot = candidate_slots(&provider, req.date)?
            .into_iter()
            .find(|s| s.window.start == req.time)
            .ok_or_else(|| {
                SchedulingError::Validation(format!(
                    "{} is not a bookable slot for provider {} on {}",
                    req.time.format("%H:%M"),
                    req.provider_id,
                    req.date
                ))
            })?;
        if let Some(room_id) = req.room_id {
            self.reservations.require_room(room_id).await?;
        }

        let mut keys = vec![ScheduleKey::Provider(req.provider_id, req.date)];
        if let Some(room_id) = req.room_id {
            keys.push(ScheduleKey::Room(room_id, req.date));
        }
        let guard = self.locks.acquire(&keys, self.reservations.timeout()).await?;

        let db = &self.reservations;
        let store = db.store();
        let slot_conflict = || SchedulingError::SlotConflict {
            provider_id: req.provider_id,
            date: req.date,
            window: slot.window,
        };

        let existing = db.call(store.list_appointments(req.provider_id, req.date)).await?;
        if first_overlap(&existing, &slot.window).is_some() {
            return Err(slot_conflict());
        }
        self.ensure_no_room_hold(req.provider_id, req.date, &slot.window).await?;

        let mut appt = db
            .call(store.create_appointment(NewAppointment {
                provider_id: req.provider_id,
                date: req.date,
                window: slot.window,
                status: AppointmentStatus::Booked,
                patient_id: req.patient.patient_id,
                note: req.patient.note.clone(),
            }))
            .await
            .map_err(|e| match e {
                StoreError::Uniqueness(Overlap::ProviderAppointment) => slot_conflict(),
                StoreError::Uniqueness(Overlap::ProviderAssignment) => SchedulingError::ProviderConflict {
                    provider_id: req.provider_id,
                    date: req.date,
                    existing: slot.window,
                },
                other => other.into(),
            })?;

        if let Some(room_id) = req.room_id {
            let claim = AssignRoom {
                room_id,
                provider_id: req.provider_id,
                date: req.date,
                window: slot.window,
                appointment_id: Some(appt.appointment_id),
            };
            if let Err(e) = self.allocator.assign_held(&guard, claim).await {
                // undo the booking so a failed room claim leaves nothing behind
                let undo = db
                    .call(store.update_appointment_status(
                        appt.appointment_id,
                        AppointmentStatus::Booked,
                        AppointmentStatus::Cancelled,
                        Some("room assignment failed"),
                    ))
                    .await;
                if let Err(undo_err) = undo {
                    tracing::error!(
                        appointment_id = %appt.appointment_id,
                        "could not roll back booking after room conflict: {undo_err}"
                    );
                }
                return Err(e);
            }
            appt.room_id = Some(room_id);
        }

        tracing::info!(
            appointment_id = %appt.appointment_id,
            provider_id = %appt.provider_id,
            "slot booked {} {}",
            appt.date,
            appt.window
        );
        Ok(appt)
    }

    /// Administrative block. Blocks never overlap bookings or other blocks;
    /// to book a blocked slot, cancel the block first.
    pub async fn block_slot(&self, req: BlockSlot) -> Result<Appointment, SchedulingError> {
        let provider = self.reservations.require_provider(req.provider_id).await?;
        let working_hours = TimeWindow::new(provider.day_start, provider.day_end);
        if !working_hours.is_some_and(|day| day.contains(&req.window)) {
            return Err(SchedulingError::Validation(format!(
                "block {} lies outside the working hours of provider {}",
                req.window, req.provider_id
            )));
        }

        let _guard = self
            .locks
            .acquire(&[ScheduleKey::Provider(req.provider_id, req.date)], self.reservations.timeout())
            .await?;

        let db = &self.reservations;
        let store = db.store();
        let slot_conflict = || SchedulingError::SlotConflict {
            provider_id: req.provider_id,
            date: req.date,
            window: req.window,
        };

        let existing = db.call(store.list_appointments(req.provider_id, req.date)).await?;
        if first_overlap(&existing, &req.window).is_some() {
            return Err(slot_conflict());
        }
        self.ensure_no_room_hold(req.provider_id, req.date, &req.window).await?;

        let block = db
            .call(store.create_appointment(NewAppointment {
                provider_id: req.provider_id,
                date: req.date,
                window: req.window,
                status: AppointmentStatus::Blocked,
                patient_id: None,
                note: req.note.clone(),
            }))
            .await
            .map_err(|e| match e {
                StoreError::Uniqueness(Overlap::ProviderAppointment) => slot_conflict(),
                StoreError::Uniqueness(Overlap::ProviderAssignment) => SchedulingError::ProviderConflict {
                    provider_id: req.provider_id,
                    date: req.date,
                    existing: req.window,
                },
                other => other.into(),
            })?;

        tracing::info!(appointment_id = %block.appointment_id, "slot blocked {} {}", block.date, block.window);
        Ok(block)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let db = &self.reservations;
        db.call(db.store().get_appointment(appointment_id))
            .await?
            .ok_or(SchedulingError::NotFound {
                entity: "appointment",
                id: appointment_id,
            })
    }

    pub async fn assign_room(&self, req: AssignRoom) -> Result<RoomAssignment, SchedulingError> {
        self.allocator.assign(req).await
    }

    pub async fn release_room(&self, assignment_id: Uuid) -> Result<RoomAssignment, SchedulingError> {
        self.allocator.release(assignment_id).await
    }

    pub async fn list_room_assignments(
        &self,
        scope: AssignmentScope,
        date: NaiveDate,
    ) -> Result<Vec<RoomAssignment>, SchedulingError> {
        self.allocator.list(scope, date).await
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        note: Option<&str>,
    ) -> Result<CancellationOutcome, SchedulingError> {
        self.cancellations.cancel(appointment_id, note).await
    }

    pub async fn cancel_appointments(&self, appointment_ids: &[Uuid], note: Option<&str>) -> Vec<CancelResult> {
        self.cancellations.cancel_many(appointment_ids, note).await
    }
}
