//! Escrow account persistence.
//!
//! Settlement transitions run under the store's write lock so "release only
//! if funded" / "return only if funded" cannot interleave: the deposit state
//! guard in the domain model plus this lock is what prevents two workers
//! from double-releasing one deposit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use payrun_core::{BusinessId, Currency, Money};
use payrun_escrow::{DepositId, EscrowAccount, EscrowDeposit, EscrowError, Settlement};

/// Escrow store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EscrowStoreError {
    #[error("no escrow account for business {0}")]
    AccountNotFound(BusinessId),
    #[error("escrow account already exists for business {0}")]
    AccountExists(BusinessId),
    #[error(transparent)]
    Escrow(#[from] EscrowError),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Escrow store abstraction.
pub trait EscrowStore: Send + Sync {
    fn open_account(&self, business: BusinessId, currency: Currency)
        -> Result<(), EscrowStoreError>;

    /// Add external funds to a business's available balance.
    fn top_up(&self, business: BusinessId, amount: Money) -> Result<(), EscrowStoreError>;

    /// Ring-fence `amount + fee` into a new funded deposit.
    fn fund_deposit(
        &self,
        business: BusinessId,
        amount: Money,
        fee: Money,
        at: DateTime<Utc>,
    ) -> Result<DepositId, EscrowStoreError>;

    fn deposit(
        &self,
        business: BusinessId,
        id: DepositId,
    ) -> Result<Option<EscrowDeposit>, EscrowStoreError>;

    /// Atomic conditional funded → released.
    fn release(
        &self,
        business: BusinessId,
        id: DepositId,
        at: DateTime<Utc>,
    ) -> Result<Settlement, EscrowStoreError>;

    /// Atomic conditional funded → returned.
    fn return_funds(
        &self,
        business: BusinessId,
        id: DepositId,
        at: DateTime<Utc>,
    ) -> Result<Settlement, EscrowStoreError>;

    fn available_balance(&self, business: BusinessId) -> Result<Money, EscrowStoreError>;
}

/// In-memory escrow store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEscrowStore {
    accounts: RwLock<HashMap<BusinessId, EscrowAccount>>,
}

impl InMemoryEscrowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn with_account_mut<T>(
        &self,
        business: BusinessId,
        f: impl FnOnce(&mut EscrowAccount) -> Result<T, EscrowStoreError>,
    ) -> Result<T, EscrowStoreError> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&business)
            .ok_or(EscrowStoreError::AccountNotFound(business))?;
        f(account)
    }
}

impl EscrowStore for InMemoryEscrowStore {
    fn open_account(
        &self,
        business: BusinessId,
        currency: Currency,
    ) -> Result<(), EscrowStoreError> {
        let mut accounts = self.accounts.write().unwrap();
        if accounts.contains_key(&business) {
            return Err(EscrowStoreError::AccountExists(business));
        }
        accounts.insert(business, EscrowAccount::new(business, currency));
        Ok(())
    }

    fn top_up(&self, business: BusinessId, amount: Money) -> Result<(), EscrowStoreError> {
        self.with_account_mut(business, |account| Ok(account.top_up(amount)?))
    }

    fn fund_deposit(
        &self,
        business: BusinessId,
        amount: Money,
        fee: Money,
        at: DateTime<Utc>,
    ) -> Result<DepositId, EscrowStoreError> {
        self.with_account_mut(business, |account| Ok(account.fund_deposit(amount, fee, at)?))
    }

    fn deposit(
        &self,
        business: BusinessId,
        id: DepositId,
    ) -> Result<Option<EscrowDeposit>, EscrowStoreError> {
        let accounts = self.accounts.read().unwrap();
        let account = accounts
            .get(&business)
            .ok_or(EscrowStoreError::AccountNotFound(business))?;
        Ok(account.deposit(id).cloned())
    }

    fn release(
        &self,
        business: BusinessId,
        id: DepositId,
        at: DateTime<Utc>,
    ) -> Result<Settlement, EscrowStoreError> {
        self.with_account_mut(business, |account| Ok(account.release(id, at)?))
    }

    fn return_funds(
        &self,
        business: BusinessId,
        id: DepositId,
        at: DateTime<Utc>,
    ) -> Result<Settlement, EscrowStoreError> {
        self.with_account_mut(business, |account| Ok(account.return_funds(id, at)?))
    }

    fn available_balance(&self, business: BusinessId) -> Result<Money, EscrowStoreError> {
        let accounts = self.accounts.read().unwrap();
        let account = accounts
            .get(&business)
            .ok_or(EscrowStoreError::AccountNotFound(business))?;
        Ok(account.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn zar(s: &str) -> Money {
        Money::new(s.parse().unwrap(), Currency::new("ZAR").unwrap())
    }

    fn store_with_account(balance: &str) -> (InMemoryEscrowStore, BusinessId) {
        let store = InMemoryEscrowStore::new();
        let business = BusinessId::new();
        store
            .open_account(business, Currency::new("ZAR").unwrap())
            .unwrap();
        store.top_up(business, zar(balance)).unwrap();
        (store, business)
    }

    #[test]
    fn duplicate_account_is_rejected() {
        let (store, business) = store_with_account("100.00");
        assert!(matches!(
            store.open_account(business, Currency::new("ZAR").unwrap()),
            Err(EscrowStoreError::AccountExists(_))
        ));
    }

    #[test]
    fn settlement_round_trips_through_the_store() {
        let (store, business) = store_with_account("2000.00");
        let id = store
            .fund_deposit(business, zar("1000.00"), zar("25.00"), Utc::now())
            .unwrap();

        assert!(store.release(business, id, Utc::now()).unwrap().applied());
        assert!(!store.release(business, id, Utc::now()).unwrap().applied());
        assert_eq!(store.available_balance(business).unwrap(), zar("975.00"));
    }

    #[test]
    fn racing_settlements_apply_exactly_once() {
        let (store, business) = store_with_account("2000.00");
        let store = Arc::new(store);
        let id = store
            .fund_deposit(business, zar("1000.00"), zar("25.00"), Utc::now())
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store
                    .release(business, id, Utc::now())
                    .unwrap()
                    .applied()
            }));
        }

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();
        assert_eq!(applied, 1);
        assert_eq!(store.available_balance(business).unwrap(), zar("975.00"));
    }
}
