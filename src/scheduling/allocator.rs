// src/scheduling/allocator.rs

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{AppointmentStatus, AssignmentScope, NewRoomAssignment, RoomAssignment};
use crate::scheduling::Reservations;
use crate::scheduling::interval::TimeWindow;
use crate::scheduling::locks::{ScheduleGuard, ScheduleKey, ScheduleLocks};
use crate::store::{Overlap, StoreError};

#[derive(Debug, Clone)]
pub struct AssignRoom {
    pub room_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    /// Appointment this room is claimed for; released with it on cancel.
    pub appointment_id: Option<Uuid>,
}

impl AssignRoom {
    pub fn lock_keys(&self) -> [ScheduleKey; 2] {
        [
            ScheduleKey::Room(self.room_id, self.date),
            ScheduleKey::Provider(self.provider_id, self.date),
        ]
    }
}

#[derive(Clone)]
pub struct RoomAllocator {
    reservations: Reservations,
    locks: ScheduleLocks,
}

impl RoomAllocator {
    pub fn new(reservations: Reservations, locks: ScheduleLocks) -> Self {
        Self { reservations, locks }
    }

    pub async fn assign(&self, req: AssignRoom) -> Result<RoomAssignment, SchedulingError> {
        self.reservations.require_room(req.room_id).await?;
        self.reservations.require_provider(req.provider_id).await?;

        let guard = self
            .locks
            .acquire(&req.lock_keys(), self.reservations.timeout())
            .await?;
        self.assign_held(&guard, req).await
    }

    /// Check-and-insert for a caller that already holds both the room-day and
    /// provider-day keys of `req`.
    pub async fn assign_held(&self, guard: &ScheduleGuard, req: AssignRoom) -> Result<RoomAssignment, SchedulingError> {
        if !req.lock_keys().iter().all(|k| guard.covers(k)) {
            return Err(SchedulingError::Internal(
                "room assignment attempted without holding its schedule keys".into(),
            ));
        }

        let db = &self.reservations;
        let store = db.store();

        if let Some(appointment_id) = req.appointment_id {
            let appt = db
                .call(store.get_appointment(appointment_id))
                .await?
                .ok_or(SchedulingError::NotFound {
                    entity: "appointment",
                    id: appointment_id,
                })?;
            if appt.provider_id != req.provider_id || appt.date != req.date {
                return Err(SchedulingError::Validation(format!(
                    "appointment {appointment_id} belongs to another provider or date"
                )));
            }
            if appt.status != AppointmentStatus::Booked {
                return Err(SchedulingError::InvalidState {
                    appointment_id,
                    status: appt.status,
                });
            }
        }

        let room_taken = db
            .call(store.list_room_assignments(AssignmentScope::Room(req.room_id), req.date))
            .await?;
        if let Some(existing) = room_taken.iter().find(|a| a.window.overlaps(&req.window)) {
            return Err(SchedulingError::RoomConflict {
                room_id: req.room_id,
                date: req.date,
                existing: existing.window,
            });
        }

        let provider_rooms = db
            .call(store.list_room_assignments(AssignmentScope::Provider(req.provider_id), req.date))
            .await?;
        if let Some(existing) = provider_rooms.iter().find(|a| a.window.overlaps(&req.window)) {
            return Err(SchedulingError::ProviderConflict {
                provider_id: req.provider_id,
                date: req.date,
                existing: existing.window,
            });
        }

        let provider_appointments = db.call(store.list_appointments(req.provider_id, req.date)).await?;
        let busy = provider_appointments.iter().find(|a| {
            a.status.is_active() && Some(a.appointment_id) != req.appointment_id && a.window.overlaps(&req.window)
        });
        if let Some(existing) = busy {
            return Err(SchedulingError::ProviderConflict {
                provider_id: req.provider_id,
                date: req.date,
                existing: existing.window,
            });
        }

        let created = db
            .call(store.create_room_assignment(NewRoomAssignment {
                room_id: req.room_id,
                provider_id: req.provider_id,
                date: req.date,
                window: req.window,
                appointment_id: req.appointment_id,
            }))
            .await
            .map_err(|e| match e {
                // another instance won the race past our in-process lock
                StoreError::Uniqueness(Overlap::RoomAssignment) => SchedulingError::RoomConflict {
                    room_id: req.room_id,
                    date: req.date,
                    existing: req.window,
                },
                StoreError::Uniqueness(Overlap::ProviderAssignment | Overlap::ProviderAppointment) => {
                    SchedulingError::ProviderConflict {
                        provider_id: req.provider_id,
                        date: req.date,
                        existing: req.window,
                    }
                }
                other => other.into(),
            })?;

        if let Some(appointment_id) = req.appointment_id {
            db.call(store.set_appointment_room(appointment_id, Some(req.room_id)))
                .await?;
        }

        tracing::info!(
            assignment_id = %created.assignment_id,
            room_id = %created.room_id,
            provider_id = %created.provider_id,
            "room assigned {} {}",
            created.date,
            created.window
        );
        Ok(created)
    }

    /// Removes an assignment. A second release of the same id is `NotFound`.
    pub async fn release(&self, assignment_id: Uuid) -> Result<RoomAssignment, SchedulingError> {
        let db = &self.reservations;
        let store = db.store();

        let assignment = db
            .call(store.get_room_assignment(assignment_id))
            .await?
            .ok_or(SchedulingError::NotFound {
                entity: "room assignment",
                id: assignment_id,
            })?;

        db.call(store.delete_room_assignment(assignment_id)).await?;

        if let Some(appointment_id) = assignment.appointment_id {
            match db.call(store.set_appointment_room(appointment_id, None)).await {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(%assignment_id, room_id = %assignment.room_id, "room assignment released");
        Ok(assignment)
    }

    pub async fn list(&self, scope: AssignmentScope, date: NaiveDate) -> Result<Vec<RoomAssignment>, SchedulingError> {
        let db = &self.reservations;
        Ok(db.call(db.store().list_room_assignments(scope, date)).await?)
    }
}
