//! In-memory reservation store.
//!
//! Used when no `DATABASE_URL` is configured and by the test suite. Every
//! write checks overlap under the same lock that applies it, which gives the
//! same guarantee the exclusion constraints give in Postgres.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{Overlap, ReservationStore, SessionDirectory, StoreError, StoreResult};
use crate::models::{
    Appointment, AppointmentStatus, AssignmentScope, NewAppointment, NewRoomAssignment, Principal, Provider, Room,
    RoomAssignment,
};

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<MemoryData>>,
}

/// Reference data loaded into a fresh memory store at startup.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub sessions: Vec<SeedSession>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSession {
    /// SHA-256 hex of the bearer token.
    pub token_hash: String,
    pub user_id: Uuid,
    pub role: i16,
}

#[derive(Default)]
struct MemoryData {
    providers: HashMap<Uuid, Provider>,
    rooms: HashMap<Uuid, Room>,
    appointments: HashMap<Uuid, Appointment>,
    assignments: HashMap<Uuid, RoomAssignment>,
    sessions: HashMap<String, Principal>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_provider(&self, provider: Provider) {
        if let Ok(mut data) = self.data.write() {
            data.providers.insert(provider.provider_id, provider);
        }
    }

    pub fn insert_room(&self, room: Room) {
        if let Ok(mut data) = self.data.write() {
            data.rooms.insert(room.room_id, room);
        }
    }

    /// Registers a session under the hash of its bearer token.
    pub fn insert_session(&self, token_hash: impl Into<String>, principal: Principal) {
        if let Ok(mut data) = self.data.write() {
            data.sessions.insert(token_hash.into(), principal);
        }
    }

    pub fn load_seed(&self, seed: Seed) {
        let (providers, rooms, sessions) = (seed.providers.len(), seed.rooms.len(), seed.sessions.len());
        seed.providers.into_iter().for_each(|p| self.insert_provider(p));
        seed.rooms.into_iter().for_each(|r| self.insert_room(r));
        for s in seed.sessions {
            self.insert_session(
                s.token_hash,
                Principal {
                    user_id: s.user_id,
                    role: s.role,
                },
            );
        }
        tracing::info!(providers, rooms, sessions, "memory store seeded");
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryData>> {
        self.data
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryData>> {
        self.data
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

fn sorted_by_start<T>(mut items: Vec<T>, start: impl Fn(&T) -> chrono::NaiveTime) -> Vec<T> {
    items.sort_by_key(|it| start(it));
    items
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        Ok(self.read()?.providers.get(&provider_id).cloned())
    }

    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<Room>> {
        Ok(self.read()?.rooms.get(&room_id).cloned())
    }

    async fn list_appointments(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<Vec<Appointment>> {
        let data = self.read()?;
        let items = data
            .appointments
            .values()
            .filter(|a| a.provider_id == provider_id && a.date == date)
            .cloned()
            .collect();
        Ok(sorted_by_start(items, |a: &Appointment| a.window.start))
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.read()?.appointments.get(&appointment_id).cloned())
    }

    async fn create_appointment(&self, data: NewAppointment) -> StoreResult<Appointment> {
        let mut guard = self.write()?;

        if data.status.is_active() {
            let clash = guard.appointments.values().any(|a| {
                a.provider_id == data.provider_id
                    && a.date == data.date
                    && a.status.is_active()
                    && a.window.overlaps(&data.window)
            });
            if clash {
                return Err(StoreError::Uniqueness(Overlap::ProviderAppointment));
            }

            // a new appointment is never linked yet, so any room hold of the provider counts
            let held = guard.assignments.values().any(|ra| {
                ra.provider_id == data.provider_id && ra.date == data.date && ra.window.overlaps(&data.window)
            });
            if held {
                return Err(StoreError::Uniqueness(Overlap::ProviderAssignment));
            }
        }

        let now = Utc::now();
        let appointment = Appointment {
            appointment_id: Uuid::new_v4(),
            provider_id: data.provider_id,
            date: data.date,
            window: data.window,
            status: data.status,
            room_id: None,
            patient_id: data.patient_id,
            note: data.note,
            cancel_note: None,
            created_at: now,
            updated_at: now,
        };
        guard.appointments.insert(appointment.appointment_id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        note: Option<&str>,
    ) -> StoreResult<()> {
        let mut guard = self.write()?;
        let Some(appointment) = guard.appointments.get_mut(&appointment_id) else {
            return Err(StoreError::NotFound {
                entity: "appointment",
                id: appointment_id,
            });
        };
        if appointment.status != from {
            return Err(StoreError::StatusMismatch {
                actual: appointment.status,
            });
        }
        appointment.status = to;
        if let Some(note) = note {
            appointment.cancel_note = Some(note.to_string());
        }
        appointment.updated_at = Utc::now();
        Ok(())
    }

    async fn set_appointment_room(&self, appointment_id: Uuid, room_id: Option<Uuid>) -> StoreResult<()> {
        let mut guard = self.write()?;
        let Some(appointment) = guard.appointments.get_mut(&appointment_id) else {
            return Err(StoreError::NotFound {
                entity: "appointment",
                id: appointment_id,
            });
        };
        appointment.room_id = room_id;
        appointment.updated_at = Utc::now();
        Ok(())
    }

    async fn list_room_assignments(&self, scope: AssignmentScope, date: NaiveDate) -> StoreResult<Vec<RoomAssignment>> {
        let data = self.read()?;
        let items = data
            .assignments
            .values()
            .filter(|ra| ra.date == date)
            .filter(|ra| match scope {
                AssignmentScope::Room(id) => ra.room_id == id,
                AssignmentScope::Provider(id) => ra.provider_id == id,
            })
            .cloned()
            .collect();
        Ok(sorted_by_start(items, |ra: &RoomAssignment| ra.window.start))
    }

    async fn get_room_assignment(&self, assignment_id: Uuid) -> StoreResult<Option<RoomAssignment>> {
        Ok(self.read()?.assignments.get(&assignment_id).cloned())
    }

    async fn create_room_assignment(&self, data: NewRoomAssignment) -> StoreResult<RoomAssignment> {
        let mut guard = self.write()?;

        for existing in guard.assignments.values() {
            if existing.date != data.date || !existing.window.overlaps(&data.window) {
                continue;
            }
            if existing.room_id == data.room_id {
                return Err(StoreError::Uniqueness(Overlap::RoomAssignment));
            }
            if existing.provider_id == data.provider_id {
                return Err(StoreError::Uniqueness(Overlap::ProviderAssignment));
            }
        }

        let busy = guard.appointments.values().any(|a| {
            a.provider_id == data.provider_id
                && a.date == data.date
                && a.status.is_active()
                && Some(a.appointment_id) != data.appointment_id
                && a.window.overlaps(&data.window)
        });
        if busy {
            return Err(StoreError::Uniqueness(Overlap::ProviderAppointment));
        }

        let assignment = RoomAssignment {
            assignment_id: Uuid::new_v4(),
            room_id: data.room_id,
            provider_id: data.provider_id,
            date: data.date,
            window: data.window,
            appointment_id: data.appointment_id,
            created_at: Utc::now(),
        };
        guard.assignments.insert(assignment.assignment_id, assignment.clone());
        Ok(assignment)
    }

    async fn delete_room_assignment(&self, assignment_id: Uuid) -> StoreResult<()> {
        match self.write()?.assignments.remove(&assignment_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                entity: "room assignment",
                id: assignment_id,
            }),
        }
    }
}

#[async_trait]
impl SessionDirectory for MemoryStore {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Principal>> {
        Ok(self.read()?.sessions.get(token_hash).cloned())
    }
}
