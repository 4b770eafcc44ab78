// src/scheduling/cancellation.rs

use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{AppointmentStatus, AssignmentScope};
use crate::scheduling::Reservations;
use crate::scheduling::allocator::RoomAllocator;
use crate::store::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub appointment_id: Uuid,
    pub previous_status: AppointmentStatus,
    pub released_assignments: Vec<Uuid>,
    /// Linked assignments whose release failed after the cancel took effect.
    pub unreleased_assignments: Vec<Uuid>,
    /// Set when linked assignments could not even be listed.
    pub release_incomplete: bool,
    pub note: Option<String>,
}

#[derive(Debug)]
pub struct CancelResult {
    pub appointment_id: Uuid,
    pub result: Result<CancellationOutcome, SchedulingError>,
}

#[derive(Clone)]
pub struct CancellationCoordinator {
    reservations: Reservations,
    allocator: RoomAllocator,
}

impl CancellationCoordinator {
    pub fn new(reservations: Reservations, allocator: RoomAllocator) -> Self {
        Self { reservations, allocator }
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        note: Option<&str>,
    ) -> Result<CancellationOutcome, SchedulingError> {
        let db = &self.reservations;
        let store = db.store();

        let appt = db
            .call(store.get_appointment(appointment_id))
            .await?
            .ok_or(SchedulingError::NotFound {
                entity: "appointment",
                id: appointment_id,
            })?;

        if !appt.status.is_active() {
            return Err(SchedulingError::InvalidState {
                appointment_id,
                status: appt.status,
            });
        }

        // Compare-and-set on the status we read: a concurrent cancel of the
        // same id loses here with InvalidState.
        db.call(store.update_appointment_status(appointment_id, appt.status, AppointmentStatus::Cancelled, note))
            .await
            .map_err(|e| match e {
                StoreError::StatusMismatch { actual } => SchedulingError::InvalidState {
                    appointment_id,
                    status: actual,
                },
                other => other.into(),
            })?;

        let mut released = Vec::new();
        let mut unreleased = Vec::new();
        let mut release_incomplete = false;
        let linked = db
            .call(store.list_room_assignments(AssignmentScope::Provider(appt.provider_id), appt.date))
            .await;
        match linked {
            Ok(assignments) => {
                for a in assignments.into_iter().filter(|a| a.appointment_id == Some(appointment_id)) {
                    match self.allocator.release(a.assignment_id).await {
                        Ok(_) => released.push(a.assignment_id),
                        // released concurrently by someone else
                        Err(SchedulingError::NotFound { .. }) => {}
                        Err(_) => unreleased.push(a.assignment_id),
                    }
                }
            }
            Err(_) => release_incomplete = true,
        }
        release_incomplete |= !unreleased.is_empty();

        tracing::info!(
            %appointment_id,
            provider_id = %appt.provider_id,
            released = released.len(),
            note = note.unwrap_or(""),
            "appointment cancelled"
        );

        Ok(CancellationOutcome {
            appointment_id,
            previous_status: appt.status,
            released_assignments: released,
            unreleased_assignments: unreleased,
            release_incomplete,
            note: note.map(str::to_string),
        })
    }

    /// Cancels every id independently and concurrently. Results come back in
    /// input order; one failure never undoes another id's cancellation.
    pub async fn cancel_many(&self, appointment_ids: &[Uuid], note: Option<&str>) -> Vec<CancelResult> {
        let mut set = JoinSet::new();
        for (idx, &appointment_id) in appointment_ids.iter().enumerate() {
            let this = self.clone();
            let note = note.map(str::to_string);
            set.spawn(async move { (idx, this.cancel(appointment_id, note.as_deref()).await) });
        }

        let mut slots: Vec<Option<Result<CancellationOutcome, SchedulingError>>> =
            (0..appointment_ids.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::error!("cancellation task failed: {e}"),
            }
        }

        appointment_ids
            .iter()
            .zip(slots)
            .map(|(&appointment_id, result)| CancelResult {
                appointment_id,
                result: result.unwrap_or_else(|| Err(SchedulingError::Internal("cancellation task aborted".into()))),
            })
            .collect()
    }
}
