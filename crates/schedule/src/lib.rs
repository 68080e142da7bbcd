//! Schedule engine (recurrence rules, business-day calendar).
//!
//! Pure domain logic only: no IO, no queues, no persistence concerns.
//! Determines when a payment/payroll obligation is due and computes the next
//! run after each execution.

pub mod calendar;
pub mod schedule;

pub use calendar::BusinessCalendar;
pub use schedule::{Frequency, Schedule, ScheduleId, ScheduleStatus};
