//! Scheduled payment/payroll obligations and their recurrence rules.

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payrun_core::{BusinessId, DomainError, DomainResult, Money};

use crate::calendar::BusinessCalendar;

/// Unique schedule identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub Uuid);

impl ScheduleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recurrence rule for a schedule.
///
/// Month-based frequencies advance by calendar months (month-end clamped),
/// never by a fixed day offset, so a monthly schedule does not drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    Annually,
}

impl Frequency {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Frequency::Once)
    }

    /// The next occurrence after `from`, before business-day rolling.
    /// `None` for one-shot schedules.
    fn next_occurrence(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Once => None,
            Frequency::Daily => from.checked_add_days(Days::new(1)),
            Frequency::Weekly => from.checked_add_days(Days::new(7)),
            Frequency::Fortnightly => from.checked_add_days(Days::new(14)),
            Frequency::Monthly => from.checked_add_months(Months::new(1)),
            Frequency::Quarterly => from.checked_add_months(Months::new(3)),
            Frequency::Annually => from.checked_add_months(Months::new(12)),
        }
    }
}

/// Schedule lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Cancelled,
}

/// A scheduled obligation: "pay this amount to a receiver on this cadence".
///
/// Owned by one business. The engine only ever mutates `next_run_at`,
/// `last_run_at` and `status`; creation/editing is a user-facing concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub business_id: BusinessId,
    pub frequency: Frequency,
    pub amount: Money,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: ScheduleStatus,
}

impl Schedule {
    pub fn new(
        business_id: BusinessId,
        frequency: Frequency,
        amount: Money,
        first_run_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ScheduleId::new(),
            business_id,
            frequency,
            amount,
            next_run_at: Some(first_run_at),
            last_run_at: None,
            status: ScheduleStatus::Active,
        }
    }

    /// Due = active with a next run at or before `now`.
    ///
    /// Paused and cancelled schedules are never due, and a schedule without a
    /// `next_run_at` has nothing left to run.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active
            && self.next_run_at.is_some_and(|at| at <= now)
    }

    pub fn pause(&mut self) {
        if self.status == ScheduleStatus::Active {
            self.status = ScheduleStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == ScheduleStatus::Paused {
            self.status = ScheduleStatus::Active;
        }
    }

    pub fn cancel(&mut self) {
        self.status = ScheduleStatus::Cancelled;
        self.next_run_at = None;
    }

    /// Advance after an execution.
    ///
    /// One-shot schedules go terminal (cancelled, nothing left to run).
    /// Recurring schedules move `next_run_at` forward by the frequency
    /// interval and then roll to the next business day. Returns the new
    /// `next_run_at` (`None` once terminal). The result is always strictly
    /// after the previous `next_run_at`.
    pub fn advance(
        &mut self,
        now: DateTime<Utc>,
        calendar: &BusinessCalendar,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        if self.status == ScheduleStatus::Cancelled {
            return Err(DomainError::conflict("cannot advance a cancelled schedule"));
        }
        let anchor = self
            .next_run_at
            .ok_or_else(|| DomainError::invariant("schedule has no next_run_at to advance"))?;

        self.last_run_at = Some(now);

        match self.frequency.next_occurrence(anchor) {
            None => {
                // One-shot: ran exactly once, nothing left to schedule.
                self.cancel();
                Ok(None)
            }
            Some(next) => {
                let next = calendar.roll_forward(next);
                self.next_run_at = Some(next);
                Ok(Some(next))
            }
        }
    }
}
