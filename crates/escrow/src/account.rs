//! Per-business escrow account: available balance plus live deposits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use payrun_core::{BusinessId, Currency, Money};

use crate::deposit::{DepositId, DepositState, EscrowDeposit, EscrowError, Settlement};

/// A business's escrow account.
///
/// Single-currency. Every cent is in exactly one bucket: `available`,
/// ring-fenced in a funded deposit, `fees_collected`, or `paid_out`.
/// Returned deposits flow back into `available`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    business_id: BusinessId,
    currency: Currency,
    available: Decimal,
    deposits: HashMap<DepositId, EscrowDeposit>,
    fees_collected: Decimal,
    paid_out: Decimal,
    /// Total ever funded into the account, for conservation checks.
    funded_in: Decimal,
}

impl EscrowAccount {
    pub fn new(business_id: BusinessId, currency: Currency) -> Self {
        Self {
            business_id,
            currency,
            available: Decimal::ZERO,
            deposits: HashMap::new(),
            fees_collected: Decimal::ZERO,
            paid_out: Decimal::ZERO,
            funded_in: Decimal::ZERO,
        }
    }

    pub fn business_id(&self) -> BusinessId {
        self.business_id
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn available(&self) -> Money {
        Money::new(self.available, self.currency.clone())
    }

    pub fn fees_collected(&self) -> Money {
        Money::new(self.fees_collected, self.currency.clone())
    }

    pub fn paid_out(&self) -> Money {
        Money::new(self.paid_out, self.currency.clone())
    }

    /// Sum ring-fenced in funded (unsettled) deposits.
    pub fn held(&self) -> Money {
        let held = self
            .deposits
            .values()
            .filter(|d| d.state == DepositState::Funded)
            .map(|d| d.amount.amount())
            .sum();
        Money::new(held, self.currency.clone())
    }

    pub fn deposit(&self, id: DepositId) -> Option<&EscrowDeposit> {
        self.deposits.get(&id)
    }

    /// Conservation invariant: every funded cent is accounted for.
    pub fn is_balanced(&self) -> bool {
        self.available + self.held().amount() + self.fees_collected + self.paid_out
            == self.funded_in
    }

    /// Add external funds to the available balance.
    pub fn top_up(&mut self, amount: Money) -> Result<(), EscrowError> {
        self.check_currency(&amount)?;
        if !amount.is_positive() {
            return Err(payrun_core::DomainError::validation("top-up must be positive").into());
        }
        self.available += amount.amount();
        self.funded_in += amount.amount();
        Ok(())
    }

    /// Ring-fence `amount + fee` from the available balance into a new
    /// funded deposit. Fails without mutating if funds are short.
    pub fn fund_deposit(
        &mut self,
        amount: Money,
        fee: Money,
        at: DateTime<Utc>,
    ) -> Result<DepositId, EscrowError> {
        self.check_currency(&amount)?;
        let gross = amount.checked_add(&fee)?;
        if gross.amount() > self.available {
            return Err(EscrowError::InsufficientFunds {
                needed: gross,
                available: self.available(),
            });
        }
        let deposit = EscrowDeposit::new(self.business_id, gross.clone(), fee, at)?;
        let id = deposit.id;
        self.available -= gross.amount();
        self.deposits.insert(id, deposit);
        Ok(id)
    }

    /// Settle a deposit as released: fee to the platform, remainder paid out.
    /// Idempotent per the deposit state machine.
    pub fn release(
        &mut self,
        id: DepositId,
        at: DateTime<Utc>,
    ) -> Result<Settlement, EscrowError> {
        let deposit = self
            .deposits
            .get_mut(&id)
            .ok_or(EscrowError::DepositNotFound(id))?;
        let outcome = deposit.release(at)?;
        if outcome.applied() {
            self.fees_collected += deposit.fee.amount();
            self.paid_out += deposit.net_amount().amount();
        }
        Ok(outcome)
    }

    /// Settle a deposit as returned: full gross back to the available balance.
    /// Idempotent per the deposit state machine.
    pub fn return_funds(
        &mut self,
        id: DepositId,
        at: DateTime<Utc>,
    ) -> Result<Settlement, EscrowError> {
        let deposit = self
            .deposits
            .get_mut(&id)
            .ok_or(EscrowError::DepositNotFound(id))?;
        let outcome = deposit.return_funds(at)?;
        if outcome.applied() {
            self.available += deposit.amount.amount();
        }
        Ok(outcome)
    }

    fn check_currency(&self, money: &Money) -> Result<(), EscrowError> {
        if money.currency() != &self.currency {
            return Err(payrun_core::DomainError::currency_mismatch(
                self.currency.as_str(),
                money.currency().as_str(),
            )
            .into());
        }
        Ok(())
    }
}
