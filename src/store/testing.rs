//! Test double that wraps [`MemoryStore`] and misbehaves on request.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::memory::MemoryStore;
use super::{ReservationStore, SessionDirectory, StoreResult};
use crate::models::{
    Appointment, AppointmentStatus, AssignmentScope, NewAppointment, NewRoomAssignment, Principal, Provider, Room,
    RoomAssignment,
};
use crate::scheduling::interval::TimeWindow;

#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    /// `list_appointments` sleeps this long before answering.
    appointments_stall: Arc<Mutex<Option<Duration>>>,
    /// `resolve_session` sleeps this long before answering.
    sessions_stall: Arc<Mutex<Option<Duration>>>,
    /// Rows appended to `list_appointments` as if another writer had left them.
    extra: Arc<Mutex<Vec<Appointment>>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn stall_appointments(&self, delay: Duration) {
        *self.appointments_stall.lock().unwrap() = Some(delay);
    }

    pub fn stall_sessions(&self, delay: Duration) {
        *self.sessions_stall.lock().unwrap() = Some(delay);
    }

    pub fn leak_appointment(&self, provider_id: Uuid, date: NaiveDate, window: TimeWindow, status: AppointmentStatus) {
        let now = chrono::Utc::now();
        self.extra.lock().unwrap().push(Appointment {
            appointment_id: Uuid::new_v4(),
            provider_id,
            date,
            window,
            status,
            room_id: None,
            patient_id: None,
            note: None,
            cancel_note: None,
            created_at: now,
            updated_at: now,
        });
    }

}

async fn maybe_stall(stall: &Mutex<Option<Duration>>) {
    let delay = *stall.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl ReservationStore for FaultyStore {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>> {
        self.inner.get_provider(provider_id).await
    }

    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<Room>> {
        self.inner.get_room(room_id).await
    }

    async fn list_appointments(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<Vec<Appointment>> {
        maybe_stall(&self.appointments_stall).await;
        let mut rows = self.inner.list_appointments(provider_id, date).await?;
        let extra = self.extra.lock().unwrap().clone();
        rows.extend(extra.into_iter().filter(|a| a.provider_id == provider_id && a.date == date));
        rows.sort_by_key(|a| a.window.start);
        Ok(rows)
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>> {
        self.inner.get_appointment(appointment_id).await
    }

    async fn create_appointment(&self, data: NewAppointment) -> StoreResult<Appointment> {
        self.inner.create_appointment(data).await
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        note: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.update_appointment_status(appointment_id, from, to, note).await
    }

    async fn set_appointment_room(&self, appointment_id: Uuid, room_id: Option<Uuid>) -> StoreResult<()> {
        self.inner.set_appointment_room(appointment_id, room_id).await
    }

    async fn list_room_assignments(&self, scope: AssignmentScope, date: NaiveDate) -> StoreResult<Vec<RoomAssignment>> {
        self.inner.list_room_assignments(scope, date).await
    }

    async fn get_room_assignment(&self, assignment_id: Uuid) -> StoreResult<Option<RoomAssignment>> {
        self.inner.get_room_assignment(assignment_id).await
    }

    async fn create_room_assignment(&self, data: NewRoomAssignment) -> StoreResult<RoomAssignment> {
        self.inner.create_room_assignment(data).await
    }

    async fn delete_room_assignment(&self, assignment_id: Uuid) -> StoreResult<()> {
        self.inner.delete_room_assignment(assignment_id).await
    }
}

#[async_trait]
impl SessionDirectory for FaultyStore {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Principal>> {
        maybe_stall(&self.sessions_stall).await;
        self.inner.resolve_session(token_hash).await
    }
}
