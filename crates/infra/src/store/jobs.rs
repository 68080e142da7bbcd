//! Job persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use payrun_jobs::{Job, JobId, JobStatus};

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result of a claim attempt.
///
/// The claim is the atomic `pending → processing` transition; exactly one
/// caller gets `Claimed`, everyone else learns the job's current state.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// This call performed the transition.
    Claimed(Job),
    /// Another worker holds the job; its gateway call may be in flight.
    AlreadyProcessing(Job),
    /// The job already reached `succeeded` or `failed`.
    AlreadyTerminal(Job),
}

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Atomically claim the job for execution (conditional on `pending`).
    fn claim(&self, job_id: JobId, now: DateTime<Utc>) -> Result<ClaimOutcome, JobStoreError>;

    /// Pending jobs that have no in-flight queue entry (sync marker unset).
    fn list_pending_unenqueued(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Stamp the queue-sync marker.
    fn mark_enqueued(&self, job_id: JobId, now: DateTime<Utc>) -> Result<(), JobStoreError>;
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim(&self, job_id: JobId, now: DateTime<Utc>) -> Result<ClaimOutcome, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        match job.status {
            JobStatus::Pending => {
                job.begin_processing(now)
                    .map_err(|e| JobStoreError::Storage(e.to_string()))?;
                Ok(ClaimOutcome::Claimed(job.clone()))
            }
            JobStatus::Processing => Ok(ClaimOutcome::AlreadyProcessing(job.clone())),
            JobStatus::Succeeded | JobStatus::Failed => {
                Ok(ClaimOutcome::AlreadyTerminal(job.clone()))
            }
        }
    }

    fn list_pending_unenqueued(&self) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.enqueued_at.is_none())
            .cloned()
            .collect();
        result.sort_by_key(|j| j.created_at);
        Ok(result)
    }

    fn mark_enqueued(&self, job_id: JobId, now: DateTime<Utc>) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        job.mark_enqueued(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrun_core::{BusinessId, Currency, Money, ReceiverId};
    use payrun_jobs::JobKind;
    use payrun_schedule::ScheduleId;

    fn zar(s: &str) -> Money {
        Money::new(s.parse().unwrap(), Currency::new("ZAR").unwrap())
    }

    fn job() -> Job {
        Job::new(
            ScheduleId::new(),
            BusinessId::new(),
            ReceiverId::new(),
            JobKind::Payment,
            zar("100.00"),
            zar("2.50"),
        )
        .unwrap()
    }

    #[test]
    fn claim_transitions_exactly_once() {
        let store = InMemoryJobStore::new();
        let id = store.insert(job()).unwrap();

        let first = store.claim(id, Utc::now()).unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed(_)));

        let second = store.claim(id, Utc::now()).unwrap();
        assert!(matches!(second, ClaimOutcome::AlreadyProcessing(_)));
    }

    #[test]
    fn claim_reports_terminal_jobs() {
        let store = InMemoryJobStore::new();
        let id = store.insert(job()).unwrap();

        let ClaimOutcome::Claimed(mut claimed) = store.claim(id, Utc::now()).unwrap() else {
            panic!("expected claim");
        };
        claimed.complete("txn-1", Utc::now()).unwrap();
        store.update(&claimed).unwrap();

        let outcome = store.claim(id, Utc::now()).unwrap();
        assert!(matches!(outcome, ClaimOutcome::AlreadyTerminal(_)));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = InMemoryJobStore::new();
        let j = job();
        store.insert(j.clone()).unwrap();
        assert!(matches!(
            store.insert(j),
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn pending_unenqueued_listing_respects_the_marker() {
        let store = InMemoryJobStore::new();
        let a = store.insert(job()).unwrap();
        let b = store.insert(job()).unwrap();

        assert_eq!(store.list_pending_unenqueued().unwrap().len(), 2);

        store.mark_enqueued(a, Utc::now()).unwrap();
        let remaining = store.list_pending_unenqueued().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);
    }
}
