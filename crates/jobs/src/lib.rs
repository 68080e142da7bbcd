//! Payment/payroll job entities and their status machine.
//!
//! A job is one obligation instance: pay one receiver (payment job) or one
//! employee (payroll line) a fixed amount, funded by exactly one escrow
//! deposit. Pure domain logic only.

pub mod job;

pub use job::{Job, JobId, JobKind, JobStatus};
