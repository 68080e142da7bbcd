//! Persistence traits + in-memory implementations.
//!
//! The real deployment backs these with a transactional database; the
//! in-memory variants serve tests, dev and single-process setups. Every
//! conditional transition (claim, settle) happens under the store's write
//! lock, the in-process analogue of an atomic conditional update.

pub mod escrow;
pub mod jobs;
pub mod schedules;
