use std::sync::Arc;

use thiserror::Error;

use stockbook_inventory::{
    CostLayer, InventoryBalance, InventoryTransaction, StockKey, TransactionFilter,
};

use super::unit_of_work::UnitOfWork;

/// Storage operation error.
///
/// Infrastructure failures (locking, concurrency, poisoned state) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    #[error("key {0} is not part of this unit of work")]
    NotLeased(StockKey),

    #[error("storage state poisoned: {0}")]
    Poisoned(String),
}

/// A balance as it was before a commit and as it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: Option<InventoryBalance>,
    pub after: InventoryBalance,
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub balances: Vec<BalanceChange>,
    pub transactions: Vec<InventoryTransaction>,
}

/// Transactional inventory storage.
///
/// ## Unit of work
///
/// `begin` leases the given keys exclusively and snapshots their balances and
/// layers into a [`UnitOfWork`]. Callers stage every change on the unit of
/// work, then hand it to `commit`, which must:
/// - re-check each touched balance against the version observed at `begin`
/// - write balances, layers and ledger entries all together or not at all
/// - advance the version of each written balance by one
///
/// Dropping a unit of work without committing it is a rollback: nothing staged
/// reaches storage and the leases are released.
///
/// ## Ledger
///
/// The ledger is append-only. There is no operation to update or delete an
/// entry; `transactions` returns matches in append order.
pub trait InventoryStore: Send + Sync {
    fn begin(&self, keys: &[StockKey]) -> Result<UnitOfWork, StoreError>;

    fn commit(&self, uow: UnitOfWork) -> Result<CommitReceipt, StoreError>;

    fn balance(&self, key: &StockKey) -> Result<Option<InventoryBalance>, StoreError>;

    /// All layers of `key`, exhausted ones included, in creation order.
    fn cost_layers(&self, key: &StockKey) -> Result<Vec<CostLayer>, StoreError>;

    fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn begin(&self, keys: &[StockKey]) -> Result<UnitOfWork, StoreError> {
        (**self).begin(keys)
    }

    fn commit(&self, uow: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        (**self).commit(uow)
    }

    fn balance(&self, key: &StockKey) -> Result<Option<InventoryBalance>, StoreError> {
        (**self).balance(key)
    }

    fn cost_layers(&self, key: &StockKey) -> Result<Vec<CostLayer>, StoreError> {
        (**self).cost_layers(key)
    }

    fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, StoreError> {
        (**self).transactions(filter)
    }
}
