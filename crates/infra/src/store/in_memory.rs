use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use stockbook_core::AggregateRoot;
use stockbook_inventory::{
    CostLayer, InventoryBalance, InventoryTransaction, StockKey, TransactionFilter,
};

use super::r#trait::{BalanceChange, CommitReceipt, InventoryStore, StoreError};
use super::unit_of_work::{PositionSnapshot, UnitOfWork};
use crate::config::EngineConfig;
use crate::lock::LockTable;

/// In-memory transactional inventory store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    locks: LockTable,
    lock_timeout: Option<Duration>,
    positions: RwLock<HashMap<StockKey, PositionSnapshot>>,
    ledger: RwLock<Vec<InventoryTransaction>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new().with_lock_timeout(config.lock_timeout())
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Number of ledger entries recorded so far.
    pub fn ledger_len(&self) -> usize {
        self.ledger.read().map(|l| l.len()).unwrap_or(0)
    }

    fn poisoned(what: &str) -> StoreError {
        StoreError::Poisoned(what.to_string())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn begin(&self, keys: &[StockKey]) -> Result<UnitOfWork, StoreError> {
        let lease = self.locks.acquire(keys, self.lock_timeout)?;

        let positions = self
            .positions
            .read()
            .map_err(|_| Self::poisoned("positions"))?;
        let snapshots = lease
            .keys()
            .iter()
            .map(|key| (*key, positions.get(key).cloned().unwrap_or_default()))
            .collect();
        drop(positions);

        Ok(UnitOfWork::new(lease, snapshots))
    }

    fn commit(&self, uow: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let (lease, changes, transactions) = uow.into_changes();

        let mut positions = self
            .positions
            .write()
            .map_err(|_| Self::poisoned("positions"))?;
        let mut ledger = self.ledger.write().map_err(|_| Self::poisoned("ledger"))?;

        // Validate everything before writing anything.
        for change in &changes {
            let stored = positions
                .get(&change.key)
                .and_then(|p| p.balance.as_ref())
                .map(|b| b.version());
            if !change.expected.matches(stored) {
                return Err(StoreError::Concurrency(format!(
                    "balance {} expected {:?}, found {:?}",
                    change.key, change.expected, stored
                )));
            }
        }

        let mut receipt = CommitReceipt::default();
        for change in changes {
            let position = positions.entry(change.key).or_default();
            if let Some(mut balance) = change.balance {
                balance.advance_version();
                position.balance = Some(balance.clone());
                receipt.balances.push(BalanceChange {
                    before: change.before,
                    after: balance,
                });
            }
            if let Some(layers) = change.layers {
                position.layers = layers;
            }
        }

        ledger.extend(transactions.iter().cloned());
        receipt.transactions = transactions;

        drop(ledger);
        drop(positions);
        drop(lease);

        tracing::debug!(
            balances = receipt.balances.len(),
            transactions = receipt.transactions.len(),
            "unit of work committed"
        );
        Ok(receipt)
    }

    fn balance(&self, key: &StockKey) -> Result<Option<InventoryBalance>, StoreError> {
        let positions = self
            .positions
            .read()
            .map_err(|_| Self::poisoned("positions"))?;
        Ok(positions.get(key).and_then(|p| p.balance.clone()))
    }

    fn cost_layers(&self, key: &StockKey) -> Result<Vec<CostLayer>, StoreError> {
        let positions = self
            .positions
            .read()
            .map_err(|_| Self::poisoned("positions"))?;
        let mut layers = positions
            .get(key)
            .map(|p| p.layers.clone())
            .unwrap_or_default();
        layers.sort_by_key(CostLayer::sequence);
        Ok(layers)
    }

    fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, StoreError> {
        let ledger = self.ledger.read().map_err(|_| Self::poisoned("ledger"))?;
        Ok(ledger.iter().filter(|tx| filter.matches(tx)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockbook_core::{LocationId, ProductId, TransactionId, UserId, WarehouseId};
    use stockbook_inventory::{NewCostLayer, TransactionType};

    fn test_key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new(), LocationId::new())
    }

    fn stage_receipt(uow: &mut UnitOfWork, key: StockKey) {
        let mut balance = uow
            .balance(&key)
            .unwrap()
            .cloned()
            .unwrap_or_else(|| InventoryBalance::open(key, None, None, Utc::now()));
        balance.receive(dec!(5), dec!(2), Utc::now()).unwrap();
        uow.put_balance(balance).unwrap();

        let sequence = uow.next_layer_sequence(&key).unwrap();
        uow.layers_mut(&key).unwrap().push(
            CostLayer::new(NewCostLayer {
                key,
                sequence,
                quantity: dec!(5),
                unit_cost: dec!(2),
                receipt_date: Utc::now(),
                lot: None,
                serial: None,
                source_transaction: TransactionId::new(),
                document: None,
            })
            .unwrap(),
        );
        uow.append(
            InventoryTransaction::new(
                TransactionType::Receipt,
                key,
                dec!(5),
                dec!(2),
                Utc::now(),
                UserId::new(),
            )
            .unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn commit_makes_staged_changes_visible() {
        let store = InMemoryInventoryStore::new();
        let key = test_key();

        let mut uow = store.begin(&[key]).unwrap();
        stage_receipt(&mut uow, key);
        assert!(store.balance(&key).unwrap().is_none());

        let receipt = store.commit(uow).unwrap();
        assert_eq!(receipt.balances.len(), 1);
        assert_eq!(receipt.transactions.len(), 1);

        let balance = store.balance(&key).unwrap().unwrap();
        assert_eq!(balance.on_hand(), dec!(5));
        assert_eq!(balance.version(), 1);
        assert_eq!(store.cost_layers(&key).unwrap().len(), 1);
        assert_eq!(store.transactions(&TransactionFilter::for_key(key)).unwrap().len(), 1);
    }

    #[test]
    fn dropped_unit_of_work_leaves_storage_untouched() {
        let store = InMemoryInventoryStore::new();
        let key = test_key();

        let mut uow = store.begin(&[key]).unwrap();
        stage_receipt(&mut uow, key);
        drop(uow);

        assert!(store.balance(&key).unwrap().is_none());
        assert!(store.cost_layers(&key).unwrap().is_empty());
        assert_eq!(store.ledger_len(), 0);

        // The lease was released too.
        assert!(store.begin(&[key]).is_ok());
    }

    #[test]
    fn versions_advance_once_per_commit() {
        let store = InMemoryInventoryStore::new();
        let key = test_key();

        for expected in 1..=3 {
            let mut uow = store.begin(&[key]).unwrap();
            stage_receipt(&mut uow, key);
            store.commit(uow).unwrap();
            assert_eq!(store.balance(&key).unwrap().unwrap().version(), expected);
        }
        let layers = store.cost_layers(&key).unwrap();
        let sequences: Vec<u64> = layers.iter().map(CostLayer::sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn stale_version_is_rejected_without_partial_write() {
        let store = InMemoryInventoryStore::new();
        let key = test_key();
        let other = test_key();

        let mut uow = store.begin(&[key]).unwrap();
        stage_receipt(&mut uow, key);
        store.commit(uow).unwrap();

        // Forge a unit of work whose snapshot predates the commit above.
        let lease = store.locks.acquire(&[key, other], None).unwrap();
        let mut stale = UnitOfWork::new(
            lease,
            vec![(key, PositionSnapshot::default()), (other, PositionSnapshot::default())],
        );
        stage_receipt(&mut stale, other);
        stage_receipt(&mut stale, key);

        let err = store.commit(stale).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert!(store.balance(&other).unwrap().is_none());
        assert_eq!(store.ledger_len(), 1);
    }

    #[test]
    fn lock_timeout_surfaces_as_store_error() {
        let store = InMemoryInventoryStore::new().with_lock_timeout(Some(Duration::from_millis(10)));
        let key = test_key();

        let _held = store.begin(&[key]).unwrap();
        let err = store.begin(&[key]).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));
    }
}
