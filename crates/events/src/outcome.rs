//! Terminal job outcomes, as consumed by metrics/notification listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use payrun_jobs::{JobId, JobKind};

/// One terminal transition of one job.
///
/// Immutable fact: emitted after the job has reached `succeeded` or
/// `failed`, never before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub kind: JobKind,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn succeeded(job_id: JobId, kind: JobKind, at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            kind,
            success: true,
            failure_reason: None,
            occurred_at: at,
        }
    }

    pub fn failed(
        job_id: JobId,
        kind: JobKind,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            kind,
            success: false,
            failure_reason: Some(reason.into()),
            occurred_at: at,
        }
    }
}
