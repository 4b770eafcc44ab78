// src/scheduling/locks.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::SchedulingError;

/// Keys are ordered so multi-key acquisition always happens in one global
/// order, which keeps two callers from deadlocking on the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScheduleKey {
    Provider(Uuid, NaiveDate),
    Room(Uuid, NaiveDate),
}

const PRUNE_ABOVE: usize = 1024;

/// In-process mutual exclusion over provider-days and room-days.
#[derive(Clone, Default)]
pub struct ScheduleLocks {
    slots: Arc<Mutex<HashMap<ScheduleKey, Arc<AsyncMutex<()>>>>>,
}

/// Holds every requested key until dropped.
#[must_use]
pub struct ScheduleGuard {
    keys: Vec<ScheduleKey>,
    _held: Vec<OwnedMutexGuard<()>>,
}

impl ScheduleGuard {
    pub fn covers(&self, key: &ScheduleKey) -> bool {
        self.keys.contains(key)
    }
}

impl ScheduleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: ScheduleKey) -> Result<Arc<AsyncMutex<()>>, SchedulingError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| SchedulingError::Internal("schedule lock table poisoned".into()))?;

        if slots.len() > PRUNE_ABOVE {
            // an entry nobody holds or waits on is only referenced by the map
            slots.retain(|_, m| Arc::strong_count(m) > 1);
        }

        Ok(slots.entry(key).or_default().clone())
    }

    /// Acquires all `keys` (sorted, deduplicated) or fails with `Unavailable`
    /// once `wait` has elapsed.
    pub async fn acquire(&self, keys: &[ScheduleKey], wait: Duration) -> Result<ScheduleGuard, SchedulingError> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + wait;
        let mut held = Vec::with_capacity(keys.len());
        for key in &keys {
            let slot = self.slot(*key)?;
            let guard = tokio::time::timeout_at(deadline, slot.lock_owned())
                .await
                .map_err(|_| SchedulingError::Unavailable(format!("timed out waiting for schedule lock {key:?}")))?;
            held.push(guard);
        }

        Ok(ScheduleGuard { keys, _held: held })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn held_key_times_out_as_unavailable() {
        let locks = ScheduleLocks::new();
        let key = ScheduleKey::Provider(Uuid::new_v4(), day());

        let guard = locks.acquire(&[key], Duration::from_millis(50)).await.unwrap();
        assert!(guard.covers(&key));

        let second = locks.acquire(&[key], Duration::from_millis(20)).await;
        assert!(matches!(second, Err(SchedulingError::Unavailable(_))));

        drop(guard);
        locks.acquire(&[key], Duration::from_millis(20)).await.unwrap();
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locks = ScheduleLocks::new();
        let a = ScheduleKey::Room(Uuid::new_v4(), day());
        let b = ScheduleKey::Room(Uuid::new_v4(), day());

        let _ga = locks.acquire(&[a], Duration::from_millis(20)).await.unwrap();
        let _gb = locks.acquire(&[b], Duration::from_millis(20)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_keys_are_taken_once() {
        let locks = ScheduleLocks::new();
        let key = ScheduleKey::Room(Uuid::new_v4(), day());
        let guard = locks.acquire(&[key, key], Duration::from_millis(20)).await.unwrap();
        assert!(guard.covers(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn opposite_orders_do_not_deadlock() {
        let locks = ScheduleLocks::new();
        let a = ScheduleKey::Provider(Uuid::new_v4(), day());
        let b = ScheduleKey::Room(Uuid::new_v4(), day());

        let mut tasks = Vec::new();
        for i in 0..50 {
            let locks = locks.clone();
            let keys = if i % 2 == 0 { vec![a, b] } else { vec![b, a] };
            tasks.push(tokio::spawn(async move {
                let _g = locks.acquire(&keys, Duration::from_secs(5)).await.unwrap();
                tokio::task::yield_now().await;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
    }
}
