//! Escrow deposits and their settlement state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use payrun_core::{BusinessId, DomainError, DomainResult, Money};

/// Unique deposit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(pub Uuid);

impl DepositId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for DepositId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DepositId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Escrow error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EscrowError {
    /// The opposite settlement was requested on an already-settled deposit.
    /// Repeating the *same* settlement is a no-op, never an error.
    #[error("deposit {0} was already released; its funds cannot be returned")]
    AlreadyReleased(DepositId),
    #[error("deposit {0} was already returned; its fee cannot be released")]
    AlreadyReturned(DepositId),
    #[error("deposit not found: {0}")]
    DepositNotFound(DepositId),
    #[error("insufficient available balance: need {needed}, have {available}")]
    InsufficientFunds { needed: Money, available: Money },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Settlement state of a deposit.
///
/// `Released` and `Returned` are terminal and mutually exclusive; the deposit
/// is the ledger's unit of truth for whether money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositState {
    /// Funds are ring-fenced, waiting for the job's outcome.
    Funded,
    /// Fee skimmed to the platform, remainder paid out.
    Released,
    /// Full amount returned to the business's available balance.
    Returned,
}

impl DepositState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, DepositState::Funded)
    }
}

/// Result of applying a settlement transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// This call performed the transition.
    Applied,
    /// The deposit was already in the requested terminal state; nothing moved.
    AlreadySettled,
}

impl Settlement {
    pub fn applied(&self) -> bool {
        matches!(self, Settlement::Applied)
    }
}

/// Funds earmarked to cover one job's execution.
///
/// `amount` is the gross ring-fenced sum (job payout + platform fee);
/// `fee` is the portion the platform keeps on release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowDeposit {
    pub id: DepositId,
    pub business_id: BusinessId,
    pub amount: Money,
    pub fee: Money,
    pub state: DepositState,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl EscrowDeposit {
    pub fn new(
        business_id: BusinessId,
        amount: Money,
        fee: Money,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        amount.ensure_same_currency(&fee)?;
        if !amount.is_positive() {
            return Err(DomainError::validation("deposit amount must be positive"));
        }
        if fee.is_negative() {
            return Err(DomainError::validation("deposit fee cannot be negative"));
        }
        if fee.amount() > amount.amount() {
            return Err(DomainError::validation("fee cannot exceed deposit amount"));
        }
        Ok(Self {
            id: DepositId::new(),
            business_id,
            amount,
            fee,
            state: DepositState::Funded,
            created_at: at,
            settled_at: None,
        })
    }

    /// Payout portion: gross minus fee.
    pub fn net_amount(&self) -> Money {
        // Same currency by construction.
        Money::new(
            self.amount.amount() - self.fee.amount(),
            self.amount.currency().clone(),
        )
    }

    /// Funded → Released. Releasing an already-released deposit is a no-op;
    /// releasing a returned deposit is a conflict.
    pub fn release(&mut self, at: DateTime<Utc>) -> Result<Settlement, EscrowError> {
        match self.state {
            DepositState::Funded => {
                self.state = DepositState::Released;
                self.settled_at = Some(at);
                Ok(Settlement::Applied)
            }
            DepositState::Released => Ok(Settlement::AlreadySettled),
            DepositState::Returned => Err(EscrowError::AlreadyReturned(self.id)),
        }
    }

    /// Funded → Returned. Returning an already-returned deposit is a no-op;
    /// returning a released deposit is a conflict.
    pub fn return_funds(&mut self, at: DateTime<Utc>) -> Result<Settlement, EscrowError> {
        match self.state {
            DepositState::Funded => {
                self.state = DepositState::Returned;
                self.settled_at = Some(at);
                Ok(Settlement::Applied)
            }
            DepositState::Returned => Ok(Settlement::AlreadySettled),
            DepositState::Released => Err(EscrowError::AlreadyReleased(self.id)),
        }
    }
}
