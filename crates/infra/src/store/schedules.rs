//! Schedule persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use payrun_schedule::{Schedule, ScheduleId};

/// Schedule store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleStoreError {
    #[error("schedule not found: {0}")]
    NotFound(ScheduleId),
    #[error("schedule already exists: {0}")]
    AlreadyExists(ScheduleId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Schedule store abstraction.
pub trait ScheduleStore: Send + Sync {
    fn insert(&self, schedule: Schedule) -> Result<ScheduleId, ScheduleStoreError>;

    fn get(&self, id: ScheduleId) -> Result<Option<Schedule>, ScheduleStoreError>;

    fn update(&self, schedule: &Schedule) -> Result<(), ScheduleStoreError>;

    /// Active schedules whose `next_run_at` has elapsed.
    fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>, ScheduleStoreError>;
}

/// In-memory schedule store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    schedules: RwLock<HashMap<ScheduleId, Schedule>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn insert(&self, schedule: Schedule) -> Result<ScheduleId, ScheduleStoreError> {
        let mut schedules = self.schedules.write().unwrap();
        if schedules.contains_key(&schedule.id) {
            return Err(ScheduleStoreError::AlreadyExists(schedule.id));
        }
        let id = schedule.id;
        schedules.insert(id, schedule);
        Ok(id)
    }

    fn get(&self, id: ScheduleId) -> Result<Option<Schedule>, ScheduleStoreError> {
        let schedules = self.schedules.read().unwrap();
        Ok(schedules.get(&id).cloned())
    }

    fn update(&self, schedule: &Schedule) -> Result<(), ScheduleStoreError> {
        let mut schedules = self.schedules.write().unwrap();
        if !schedules.contains_key(&schedule.id) {
            return Err(ScheduleStoreError::NotFound(schedule.id));
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>, ScheduleStoreError> {
        let schedules = self.schedules.read().unwrap();
        let mut due: Vec<_> = schedules
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        Ok(due)
    }
}
