//! Reservation store: the persistence contract the scheduler consumes.
//!
//! Implementations must enforce window uniqueness themselves. The in-process
//! locks in the scheduler only serialize callers inside one process, so the
//! store is the last line against double booking across instances.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, AssignmentScope, NewAppointment, NewRoomAssignment, Principal, Provider, Room,
    RoomAssignment,
};

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub type StoreResult<T> = Result<T, StoreError>;

/// Which uniqueness rule a rejected write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// Two active appointments of one provider overlap.
    ProviderAppointment,
    /// Two assignments of one room overlap.
    RoomAssignment,
    /// Two assignments of one provider overlap.
    ProviderAssignment,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("uniqueness violated: {0:?}")]
    Uniqueness(Overlap),

    #[error("status is {}", .actual.as_str())]
    StatusMismatch { actual: AppointmentStatus },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get_provider(&self, provider_id: Uuid) -> StoreResult<Option<Provider>>;

    async fn get_room(&self, room_id: Uuid) -> StoreResult<Option<Room>>;

    /// All appointments of a provider on a date, any status, ordered by start.
    async fn list_appointments(&self, provider_id: Uuid, date: NaiveDate) -> StoreResult<Vec<Appointment>>;

    async fn get_appointment(&self, appointment_id: Uuid) -> StoreResult<Option<Appointment>>;

    /// Fails with `Uniqueness(ProviderAppointment)` when an active appointment
    /// of the same provider overlaps the new window, and with
    /// `Uniqueness(ProviderAssignment)` when an active one would overlap a
    /// room assignment of that provider.
    async fn create_appointment(&self, data: NewAppointment) -> StoreResult<Appointment>;

    /// Compare-and-set: moves `id` from `from` to `to`, recording `note` when
    /// given. `StatusMismatch` carries the status actually found.
    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        note: Option<&str>,
    ) -> StoreResult<()>;

    async fn set_appointment_room(&self, appointment_id: Uuid, room_id: Option<Uuid>) -> StoreResult<()>;

    /// Assignments for one room or one provider on a date, ordered by start.
    async fn list_room_assignments(&self, scope: AssignmentScope, date: NaiveDate) -> StoreResult<Vec<RoomAssignment>>;

    async fn get_room_assignment(&self, assignment_id: Uuid) -> StoreResult<Option<RoomAssignment>>;

    /// Room and provider overlaps fail as `RoomAssignment` / `ProviderAssignment`.
    /// An active appointment of the provider overlapping the window, other than
    /// the linked one, fails as `ProviderAppointment`.
    async fn create_room_assignment(&self, data: NewRoomAssignment) -> StoreResult<RoomAssignment>;

    async fn delete_room_assignment(&self, assignment_id: Uuid) -> StoreResult<()>;
}

/// Resolves a hashed bearer token to the calling user.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Principal>>;
}
