//! Slot scheduling and room allocation.
//!
//! Flow: [`calendar`] lays out a month, [`availability`] expands a day into
//! candidate slots, [`conflict`] annotates them against stored reservations,
//! [`allocator`] claims rooms, and [`cancellation`] is the only way a booking
//! is released. [`service::SchedulingService`] ties them to a store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Provider, Room};
use crate::store::{ReservationStore, StoreError, StoreResult};

pub mod allocator;
pub mod availability;
pub mod calendar;
pub mod cancellation;
pub mod conflict;
pub mod interval;
pub mod locks;
pub mod service;

impl From<StoreError> for SchedulingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => SchedulingError::NotFound { entity, id },
            StoreError::Unavailable(msg) => SchedulingError::Unavailable(msg),
            other => SchedulingError::Internal(other.to_string()),
        }
    }
}

/// Store handle whose every call is bounded by `timeout`.
#[derive(Clone)]
pub struct Reservations {
    store: Arc<dyn ReservationStore>,
    timeout: Duration,
}

impl Reservations {
    pub fn new(store: Arc<dyn ReservationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &dyn ReservationStore {
        self.store.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn call<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Unavailable(format!("store call exceeded {:?}", self.timeout)))?
    }

    pub async fn require_provider(&self, provider_id: Uuid) -> Result<Provider, SchedulingError> {
        self.call(self.store.get_provider(provider_id))
            .await?
            .ok_or(SchedulingError::NotFound {
                entity: "provider",
                id: provider_id,
            })
    }

    pub async fn require_room(&self, room_id: Uuid) -> Result<Room, SchedulingError> {
        self.call(self.store.get_room(room_id))
            .await?
            .ok_or(SchedulingError::NotFound {
                entity: "room",
                id: room_id,
            })
    }
}
