//! Job executor: the state machine that moves money.
//!
//! One call, one outcome, one state transition. The gateway call is wrapped
//! in the idempotency store so at-least-once queue delivery never
//! double-charges, and every terminal transition settles the job's escrow
//! deposit (fee released on success, full gross returned on failure).

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use payrun_core::{DomainError, Money, ReceiverId};
use payrun_escrow::DepositId;
use payrun_events::{JobOutcome, OutcomeBus};
use payrun_gateway::{GatewayResult, Metadata, PaymentGateway};
use payrun_jobs::{Job, JobId, JobStatus};
use payrun_schedule::BusinessCalendar;

use crate::idempotency::{IdempotencyError, IdempotencyStore};
use crate::store::escrow::{EscrowStore, EscrowStoreError};
use crate::store::jobs::{ClaimOutcome, JobStore, JobStoreError};
use crate::store::schedules::ScheduleStore;

/// Executor error.
///
/// Anything that reaches the caller here left the job *without* a terminal
/// transition. Most importantly, idempotency-store unavailability leaves the
/// job stays `processing` as a detectable anomaly instead of guessing.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Escrow(#[from] EscrowStoreError),
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("stored gateway result could not be decoded: {0}")]
    Codec(String),
}

/// What the caller (queue worker, admin endpoint) gets back.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
}

impl ExecutionReport {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            transaction_id: job.transaction_id.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Upper bound on one gateway call; a timeout is treated as a failed
    /// attempt and the escrow is returned.
    pub gateway_timeout: Duration,
    /// Lifetime of stored gateway results. Must comfortably outlive any
    /// re-delivery window of the queue.
    pub idempotency_ttl: Duration,
    /// Calendar used when advancing the owning schedule.
    pub calendar: BusinessCalendar,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(30),
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            calendar: BusinessCalendar::new(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_calendar(mut self, calendar: BusinessCalendar) -> Self {
        self.calendar = calendar;
        self
    }
}

/// Executes one due job against the gateway under idempotency protection.
///
/// All collaborators are injected; the executor holds no global state and no
/// job-level locks; the idempotency key lock and the deposit state guard
/// carry the concurrency story.
pub struct JobExecutor {
    jobs: Arc<dyn JobStore>,
    schedules: Arc<dyn ScheduleStore>,
    escrow: Arc<dyn EscrowStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    gateway: Arc<dyn PaymentGateway>,
    outcomes: Arc<dyn OutcomeBus>,
    config: JobExecutorConfig,
}

impl JobExecutor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        schedules: Arc<dyn ScheduleStore>,
        escrow: Arc<dyn EscrowStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        gateway: Arc<dyn PaymentGateway>,
        outcomes: Arc<dyn OutcomeBus>,
        config: JobExecutorConfig,
    ) -> Self {
        Self {
            jobs,
            schedules,
            escrow,
            idempotency,
            gateway,
            outcomes,
            config,
        }
    }

    /// Execute one job to a terminal state.
    ///
    /// Safe to call again for the same job (queue re-delivery): a terminal
    /// job returns its recorded outcome, an in-flight one converges on the
    /// stored gateway result.
    pub fn execute(&self, job_id: JobId) -> Result<ExecutionReport, ExecuteError> {
        let now = Utc::now();

        let (mut job, claimed_here) = match self.jobs.claim(job_id, now)? {
            ClaimOutcome::AlreadyTerminal(job) => {
                debug!(job_id = %job.id, status = ?job.status, "job already terminal, returning recorded outcome");
                return Ok(ExecutionReport::from_job(&job));
            }
            ClaimOutcome::Claimed(job) => {
                debug!(job_id = %job.id, kind = %job.kind.as_str(), "claimed job");
                (job, true)
            }
            ClaimOutcome::AlreadyProcessing(job) => {
                debug!(job_id = %job.id, "job already processing, converging on the stored result");
                (job, false)
            }
        };

        // An escrow deposit covering amount + fee must exist before any
        // gateway call; a missing deposit is a data-integrity failure.
        let Some(deposit_id) = job.escrow_deposit_id else {
            return self.fail_job(job, None, claimed_here, "no escrow deposit funds this job");
        };
        let Some(deposit) = self.escrow.deposit(job.business_id, deposit_id)? else {
            return self.fail_job(
                job,
                None,
                claimed_here,
                format!("escrow deposit {deposit_id} does not exist"),
            );
        };
        let gross = match job.gross_amount() {
            Ok(gross) => gross,
            Err(e) => return self.fail_job(job, Some(deposit_id), claimed_here, e.to_string()),
        };
        if deposit.amount.currency() != job.amount.currency() {
            let msg = format!(
                "deposit currency {} does not match job currency {}",
                deposit.amount.currency(),
                job.amount.currency()
            );
            return self.fail_job(job, Some(deposit_id), claimed_here, msg);
        }
        if deposit.amount != gross {
            return self.fail_job(
                job,
                Some(deposit_id),
                claimed_here,
                format!("deposit {deposit_id} holds {} but the job needs {gross}", deposit.amount),
            );
        }

        // Exactly one gateway call per idempotency key, bounded by the
        // timeout. Store unavailability propagates with no transition.
        let result = self.call_gateway(&job)?;

        let now = Utc::now();
        match result {
            GatewayResult::Success { transaction_id, .. } => {
                let settlement = self.escrow.release(job.business_id, deposit_id, now)?;
                job.complete(transaction_id, now)?;
                self.jobs.update(&job)?;
                info!(job_id = %job.id, "job succeeded, fee released from escrow");
                self.publish(JobOutcome::succeeded(job.id, job.kind, now));
                if settlement.applied() {
                    self.advance_schedule(&job, now);
                }
                Ok(ExecutionReport::from_job(&job))
            }
            GatewayResult::Failure { error, .. } => {
                let settlement = self.escrow.return_funds(job.business_id, deposit_id, now)?;
                job.fail(error.clone(), now)?;
                self.jobs.update(&job)?;
                warn!(job_id = %job.id, error = %error, "job failed, escrow returned to business");
                self.publish(JobOutcome::failed(job.id, job.kind, error, now));
                if settlement.applied() {
                    self.advance_schedule(&job, now);
                }
                Ok(ExecutionReport::from_job(&job))
            }
        }
    }

    /// Run the gateway call through the idempotency store.
    fn call_gateway(&self, job: &Job) -> Result<GatewayResult, ExecuteError> {
        let key = job.idempotency_key();
        let gateway = Arc::clone(&self.gateway);
        let amount = job.amount.clone();
        let receiver = job.receiver_id;
        let timeout = self.config.gateway_timeout;

        let mut metadata = Metadata::new();
        metadata.insert("job_id".to_string(), job.id.to_string());
        metadata.insert("kind".to_string(), job.kind.as_str().to_string());
        metadata.insert("business_id".to_string(), job.business_id.to_string());

        let mut op = move || -> anyhow::Result<JsonValue> {
            let result = call_with_timeout(
                Arc::clone(&gateway),
                amount.clone(),
                receiver,
                metadata.clone(),
                timeout,
            );
            Ok(serde_json::to_value(&result)?)
        };

        let value = self
            .idempotency
            .execute(&key, self.config.idempotency_ttl, &mut op)?;
        serde_json::from_value(value).map_err(|e| ExecuteError::Codec(e.to_string()))
    }

    /// Terminal failure without a gateway call (validation/config errors).
    /// The deposit, when present, is returned in full.
    fn fail_job(
        &self,
        mut job: Job,
        deposit_id: Option<DepositId>,
        claimed_here: bool,
        error: impl Into<String>,
    ) -> Result<ExecutionReport, ExecuteError> {
        let error = error.into();
        let now = Utc::now();
        error!(job_id = %job.id, error = %error, "job failed before the gateway call");

        let advance = match deposit_id {
            Some(id) => self.escrow.return_funds(job.business_id, id, now)?.applied(),
            None => claimed_here,
        };

        job.fail(error.clone(), now)?;
        self.jobs.update(&job)?;
        self.publish(JobOutcome::failed(job.id, job.kind, error, now));
        if advance {
            self.advance_schedule(&job, now);
        }
        Ok(ExecutionReport::from_job(&job))
    }

    /// Move the owning schedule to its next occurrence. Best-effort: the job
    /// is already settled, so problems here are logged, not propagated.
    fn advance_schedule(&self, job: &Job, now: DateTime<Utc>) {
        match self.schedules.get(job.schedule_id) {
            Ok(Some(mut schedule)) => match schedule.advance(now, &self.config.calendar) {
                Ok(next) => {
                    if let Err(e) = self.schedules.update(&schedule) {
                        warn!(schedule_id = %schedule.id, error = %e, "failed to persist advanced schedule");
                    } else {
                        debug!(schedule_id = %schedule.id, next_run_at = ?next, "schedule advanced");
                    }
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "failed to advance schedule")
                }
            },
            Ok(None) => warn!(schedule_id = %job.schedule_id, "owning schedule not found"),
            Err(e) => warn!(schedule_id = %job.schedule_id, error = %e, "failed to load schedule"),
        }
    }

    fn publish(&self, outcome: JobOutcome) {
        if let Err(e) = self.outcomes.publish(outcome) {
            warn!(error = %e, "failed to publish job outcome");
        }
    }
}

/// Run the (blocking) gateway call on a helper thread so the attempt can be
/// bounded. On timeout the attempt is a failure; if the provider did land
/// the payment, the idempotency record stops any re-charge and the returned
/// escrow is reconciled manually.
fn call_with_timeout(
    gateway: Arc<dyn PaymentGateway>,
    amount: Money,
    receiver: ReceiverId,
    metadata: Metadata,
    timeout: Duration,
) -> GatewayResult {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(gateway.process_payment(&amount, receiver, &metadata));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => GatewayResult::failure(format!(
            "gateway call timed out after {}ms",
            timeout.as_millis()
        )),
    }
}
