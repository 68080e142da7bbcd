//! Pooled-account escrow variant.
//!
//! The platform operates a single pooled escrow account rather than
//! per-business accounts at the provider, so deposits, fee releases and fund
//! returns are recorded by an administrator. The programmatic surface logs
//! the request and reports failure with an instructive message.

use tracing::warn;

use payrun_core::{BusinessId, Currency, Money};
use payrun_escrow::DepositId;

use crate::gateway::EscrowGateway;
use crate::result::GatewayResult;

const MANUAL_PROCESSING: &str =
    "escrow operations are recorded manually through the administrative interface";

/// Escrow gateway for the pooled-account setup.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualEscrowGateway;

impl ManualEscrowGateway {
    pub fn new() -> Self {
        Self
    }
}

impl EscrowGateway for ManualEscrowGateway {
    fn create_escrow_account(&self, business: BusinessId, currency: &Currency) -> GatewayResult {
        warn!(%business, %currency, "create_escrow_account requested on pooled-account setup");
        GatewayResult::failure(MANUAL_PROCESSING)
    }

    fn process_deposit(&self, business: BusinessId, amount: &Money) -> GatewayResult {
        warn!(%business, %amount, "process_deposit requested on pooled-account setup");
        GatewayResult::failure(MANUAL_PROCESSING)
    }

    fn release_fee(&self, deposit: DepositId, fee: &Money) -> GatewayResult {
        warn!(%deposit, %fee, "release_fee requested on pooled-account setup");
        GatewayResult::failure(MANUAL_PROCESSING)
    }

    fn return_funds(&self, deposit: DepositId, amount: &Money) -> GatewayResult {
        warn!(%deposit, %amount, "return_funds requested on pooled-account setup");
        GatewayResult::failure(MANUAL_PROCESSING)
    }
}
