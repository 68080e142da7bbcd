//! Gateway capability traits.

use payrun_core::{BusinessId, Currency, Money, ReceiverId};
use payrun_escrow::DepositId;

use crate::result::{GatewayResult, Metadata};

/// Money-moving capabilities: pay a receiver, charge a platform fee.
///
/// Methods are total: transport problems surface as `Failure` results, and
/// timeout enforcement is the caller's concern. One call, one outcome.
pub trait PaymentGateway: Send + Sync {
    /// Execute a payment of `amount` to `receiver`.
    fn process_payment(
        &self,
        amount: &Money,
        receiver: ReceiverId,
        metadata: &Metadata,
    ) -> GatewayResult;

    /// Charge a business's platform subscription fee.
    fn charge_subscription(
        &self,
        amount: &Money,
        business: BusinessId,
        metadata: &Metadata,
    ) -> GatewayResult;
}

/// Ledger-side escrow operations at the banking provider.
pub trait EscrowGateway: Send + Sync {
    fn create_escrow_account(&self, business: BusinessId, currency: &Currency) -> GatewayResult;

    fn process_deposit(&self, business: BusinessId, amount: &Money) -> GatewayResult;

    fn release_fee(&self, deposit: DepositId, fee: &Money) -> GatewayResult;

    fn return_funds(&self, deposit: DepositId, amount: &Money) -> GatewayResult;
}
