//! Reconciliation between due jobs and the background queue.
//!
//! After a queue backend restart (or a missed enqueue) the queue and the job
//! table can disagree. `sync_all` walks pending jobs whose owning schedule is
//! due and enqueues exactly the ones without an in-flight queue entry. It is
//! safe to run concurrently with itself and with normal enqueue paths:
//! execution is idempotency-keyed, so a duplicate enqueue is harmless.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use payrun_jobs::JobKind;

use crate::queue::JobQueue;
use crate::store::jobs::JobStore;
use crate::store::schedules::ScheduleStore;

/// Per-kind sync tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCount {
    pub synced: usize,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub payment_jobs: SyncCount,
    pub payroll_jobs: SyncCount,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.payment_jobs.synced + self.payroll_jobs.synced
    }
}

/// Reconciles persisted due jobs against the queue.
pub struct JobSyncService {
    jobs: Arc<dyn JobStore>,
    schedules: Arc<dyn ScheduleStore>,
    queue: Arc<dyn JobQueue>,
}

impl JobSyncService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        schedules: Arc<dyn ScheduleStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            jobs,
            schedules,
            queue,
        }
    }

    /// One reconciliation pass.
    ///
    /// Never fails the caller: per-job problems are logged and skipped, and a
    /// broken listing yields an empty report. Worker startup and the periodic
    /// timer both call this; the next pass picks up whatever this one missed.
    pub fn sync_all(&self, now: DateTime<Utc>) -> SyncReport {
        let mut report = SyncReport::default();

        let pending = match self.jobs.list_pending_unenqueued() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "job sync could not list pending jobs, skipping this pass");
                return report;
            }
        };

        for job in pending {
            let due = match self.schedules.get(job.schedule_id) {
                Ok(Some(schedule)) => schedule.is_due(now),
                Ok(None) => {
                    warn!(job_id = %job.id, schedule_id = %job.schedule_id, "job references a missing schedule, skipping");
                    false
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "could not load owning schedule, skipping");
                    false
                }
            };
            if !due {
                continue;
            }

            if let Err(e) = self.queue.enqueue(job.id) {
                warn!(job_id = %job.id, error = %e, "failed to enqueue job, will retry next pass");
                continue;
            }
            if let Err(e) = self.jobs.mark_enqueued(job.id, now) {
                // The job will be re-enqueued next pass; idempotent
                // execution absorbs the duplicate.
                warn!(job_id = %job.id, error = %e, "failed to stamp enqueue marker");
                continue;
            }

            match job.kind {
                JobKind::Payment => report.payment_jobs.synced += 1,
                JobKind::Payroll => report.payroll_jobs.synced += 1,
            }
        }

        info!(
            payment_jobs = report.payment_jobs.synced,
            payroll_jobs = report.payroll_jobs.synced,
            "job sync completed"
        );
        report
    }
}
