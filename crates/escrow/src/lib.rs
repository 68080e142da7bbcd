//! Escrow ledger (deposits, balances, conservation).
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns.
//! A deposit ring-fences the funds backing exactly one job's execution; the
//! account tracks where every cent sits (available, held, collected, paid).

pub mod account;
pub mod deposit;

pub use account::EscrowAccount;
pub use deposit::{DepositId, DepositState, EscrowDeposit, EscrowError, Settlement};
