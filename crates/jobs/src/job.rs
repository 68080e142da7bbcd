//! Core job types and transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payrun_core::{BusinessId, DomainError, DomainResult, Money, ReceiverId, UserId};
use payrun_escrow::DepositId;
use payrun_schedule::ScheduleId;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of obligation this job settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Scheduled payment to an external receiver.
    Payment,
    /// One employee's line of a payroll run.
    Payroll,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Payment => "payment",
            JobKind::Payroll => "payroll",
        }
    }
}

/// Job execution status.
///
/// `pending → processing → {succeeded | failed}`, exactly once per logical
/// attempt. `failed` jobs are not retried here; a caller-level policy may
/// bump the generation and re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up.
    Pending,
    /// Claimed by a worker; a gateway call may be in flight.
    Processing,
    /// Paid out, fee released.
    Succeeded,
    /// Execution failed, escrow returned.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// A payment job or payroll line.
///
/// Holds a weak reference to the escrow deposit that funds it; the deposit's
/// lifecycle belongs to the escrow ledger, not the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub schedule_id: ScheduleId,
    pub business_id: BusinessId,
    pub receiver_id: ReceiverId,
    pub kind: JobKind,
    /// Payout to the receiver.
    pub amount: Money,
    /// Platform fee on top of the payout.
    pub fee: Money,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub escrow_deposit_id: Option<DepositId>,
    /// Attempt marker folded into the idempotency key; bumped by
    /// caller-level retry so each retry is a fresh logical operation.
    pub generation: u32,
    /// Set when the job has an in-flight queue entry (sync marker).
    pub enqueued_at: Option<DateTime<Utc>>,
    pub fee_released_manually_at: Option<DateTime<Utc>>,
    pub funds_returned_manually_at: Option<DateTime<Utc>>,
    pub released_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        schedule_id: ScheduleId,
        business_id: BusinessId,
        receiver_id: ReceiverId,
        kind: JobKind,
        amount: Money,
        fee: Money,
    ) -> DomainResult<Self> {
        amount.ensure_same_currency(&fee)?;
        if !amount.is_positive() {
            return Err(DomainError::validation("job amount must be positive"));
        }
        if fee.is_negative() {
            return Err(DomainError::validation("job fee cannot be negative"));
        }
        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            schedule_id,
            business_id,
            receiver_id,
            kind,
            amount,
            fee,
            status: JobStatus::Pending,
            error_message: None,
            processed_at: None,
            transaction_id: None,
            escrow_deposit_id: None,
            generation: 0,
            enqueued_at: None,
            fee_released_manually_at: None,
            funds_returned_manually_at: None,
            released_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attach the deposit that funds this job.
    pub fn with_deposit(mut self, deposit_id: DepositId) -> Self {
        self.escrow_deposit_id = Some(deposit_id);
        self
    }

    /// Gross amount the escrow deposit must cover.
    pub fn gross_amount(&self) -> DomainResult<Money> {
        self.amount.checked_add(&self.fee)
    }

    /// Deterministic key for the idempotency store. Stable across
    /// re-deliveries of the same attempt, distinct across generations.
    pub fn idempotency_key(&self) -> String {
        format!("{}-job:{}:gen:{}", self.kind.as_str(), self.id, self.generation)
    }

    /// Claim: `pending → processing`, stamping `processed_at` up front so a
    /// crash mid-execution leaves visible evidence of the attempt.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != JobStatus::Pending {
            return Err(DomainError::conflict(format!(
                "job {} is {:?}, cannot claim",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Processing;
        self.processed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `processing → succeeded` with the gateway transaction id.
    pub fn complete(&mut self, transaction_id: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::conflict(format!(
                "job {} is {:?}, cannot complete",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Succeeded;
        self.transaction_id = Some(transaction_id.into());
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// `processing → failed` with the gateway (or validation) error.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::conflict(format!(
                "job {} is {:?}, cannot fail",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = now;
        Ok(())
    }

    /// Reset a failed job for a caller-driven retry under a fresh
    /// idempotency generation.
    pub fn next_generation(&mut self, now: DateTime<Utc>) -> DomainResult<u32> {
        if self.status != JobStatus::Failed {
            return Err(DomainError::conflict(format!(
                "job {} is {:?}, only failed jobs can be retried",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Pending;
        self.generation += 1;
        self.error_message = None;
        self.processed_at = None;
        self.enqueued_at = None;
        self.updated_at = now;
        Ok(self.generation)
    }

    /// Stamp the queue-sync marker.
    pub fn mark_enqueued(&mut self, now: DateTime<Utc>) {
        self.enqueued_at = Some(now);
        self.updated_at = now;
    }

    /// Record that an administrator released the fee by hand (pooled-account
    /// setup). The escrow deposit's state guard still applies.
    pub fn record_manual_fee_release(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.fee_released_manually_at = Some(at);
        self.released_by = Some(actor);
        self.updated_at = at;
    }

    /// Record that an administrator returned the funds by hand.
    pub fn record_manual_funds_return(&mut self, actor: UserId, at: DateTime<Utc>) {
        self.funds_returned_manually_at = Some(at);
        self.released_by = Some(actor);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrun_core::Currency;

    fn zar(s: &str) -> Money {
        Money::new(s.parse().unwrap(), Currency::new("ZAR").unwrap())
    }

    fn job() -> Job {
        Job::new(
            ScheduleId::new(),
            BusinessId::new(),
            ReceiverId::new(),
            JobKind::Payment,
            zar("1000.00"),
            zar("25.00"),
        )
        .unwrap()
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut j = job();
        assert_eq!(j.status, JobStatus::Pending);

        let now = Utc::now();
        j.begin_processing(now).unwrap();
        assert_eq!(j.status, JobStatus::Processing);
        assert_eq!(j.processed_at, Some(now));

        j.complete("txn-1", Utc::now()).unwrap();
        assert_eq!(j.status, JobStatus::Succeeded);
        assert_eq!(j.transaction_id.as_deref(), Some("txn-1"));
        assert!(j.status.is_terminal());
    }

    #[test]
    fn lifecycle_failure_path() {
        let mut j = job();
        j.begin_processing(Utc::now()).unwrap();
        j.fail("declined", Utc::now()).unwrap();
        assert_eq!(j.status, JobStatus::Failed);
        assert_eq!(j.error_message.as_deref(), Some("declined"));
    }

    #[test]
    fn double_claim_is_a_conflict() {
        let mut j = job();
        j.begin_processing(Utc::now()).unwrap();
        assert!(matches!(
            j.begin_processing(Utc::now()),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut j = job();
        j.begin_processing(Utc::now()).unwrap();
        j.complete("txn-1", Utc::now()).unwrap();
        assert!(j.fail("late error", Utc::now()).is_err());
        assert!(j.begin_processing(Utc::now()).is_err());
    }

    #[test]
    fn idempotency_key_is_stable_per_generation() {
        let mut j = job();
        let key = j.idempotency_key();
        assert_eq!(key, j.idempotency_key());
        assert!(key.starts_with("payment-job:"));
        assert!(key.ends_with(":gen:0"));

        j.begin_processing(Utc::now()).unwrap();
        j.fail("declined", Utc::now()).unwrap();
        let r#gen = j.next_generation(Utc::now()).unwrap();
        assert_eq!(r#gen, 1);
        assert_eq!(j.status, JobStatus::Pending);
        assert!(j.idempotency_key().ends_with(":gen:1"));
        assert_ne!(key, j.idempotency_key());
    }

    #[test]
    fn retry_requires_a_failed_job() {
        let mut j = job();
        assert!(j.next_generation(Utc::now()).is_err());
    }

    #[test]
    fn mixed_currency_fee_is_rejected() {
        let usd = Money::new("1.00".parse().unwrap(), Currency::new("USD").unwrap());
        let err = Job::new(
            ScheduleId::new(),
            BusinessId::new(),
            ReceiverId::new(),
            JobKind::Payment,
            zar("10.00"),
            usd,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
    }

    #[test]
    fn manual_overrides_record_actor_and_time() {
        let mut j = job();
        let admin = UserId::new();
        let at = Utc::now();
        j.record_manual_fee_release(admin, at);
        assert_eq!(j.fee_released_manually_at, Some(at));
        assert_eq!(j.released_by, Some(admin));
    }
}
