use std::collections::BTreeMap;

use stockbook_core::{AggregateRoot, ExpectedVersion};
use stockbook_inventory::{CostLayer, InventoryBalance, InventoryTransaction, StockKey};

use super::r#trait::StoreError;
use crate::lock::KeyLease;

/// Balance + layers of one key as read at `begin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub balance: Option<InventoryBalance>,
    pub layers: Vec<CostLayer>,
}

#[derive(Debug)]
struct StagedPosition {
    original: Option<InventoryBalance>,
    balance: Option<InventoryBalance>,
    layers: Vec<CostLayer>,
    balance_dirty: bool,
    layers_dirty: bool,
}

/// Changes to one key, ready to be written by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionChange {
    pub key: StockKey,
    /// Version the stored balance must still have.
    pub expected: ExpectedVersion,
    pub before: Option<InventoryBalance>,
    /// New balance, if it changed.
    pub balance: Option<InventoryBalance>,
    /// Full replacement layer list, if layers changed.
    pub layers: Option<Vec<CostLayer>>,
}

/// Staged, not-yet-visible changes over a leased set of keys.
///
/// Reads see the snapshot taken at `begin` plus whatever has been staged since.
/// Nothing is visible to other callers until the owning store commits it.
#[derive(Debug)]
pub struct UnitOfWork {
    lease: KeyLease,
    positions: BTreeMap<StockKey, StagedPosition>,
    transactions: Vec<InventoryTransaction>,
}

impl UnitOfWork {
    /// Stores call this from `begin` once the lease is held.
    pub fn new(lease: KeyLease, snapshots: Vec<(StockKey, PositionSnapshot)>) -> Self {
        let positions = snapshots
            .into_iter()
            .map(|(key, snap)| {
                (
                    key,
                    StagedPosition {
                        original: snap.balance.clone(),
                        balance: snap.balance,
                        layers: snap.layers,
                        balance_dirty: false,
                        layers_dirty: false,
                    },
                )
            })
            .collect();

        Self {
            lease,
            positions,
            transactions: Vec::new(),
        }
    }

    pub fn keys(&self) -> &[StockKey] {
        self.lease.keys()
    }

    /// Current (staged) balance of `key`.
    pub fn balance(&self, key: &StockKey) -> Result<Option<&InventoryBalance>, StoreError> {
        Ok(self.position(key)?.balance.as_ref())
    }

    /// Balance of `key` as it was at `begin`.
    pub fn original_balance(
        &self,
        key: &StockKey,
    ) -> Result<Option<&InventoryBalance>, StoreError> {
        Ok(self.position(key)?.original.as_ref())
    }

    pub fn put_balance(&mut self, balance: InventoryBalance) -> Result<(), StoreError> {
        let position = self.position_mut(&balance.key())?;
        position.balance = Some(balance);
        position.balance_dirty = true;
        Ok(())
    }

    pub fn layers(&self, key: &StockKey) -> Result<&[CostLayer], StoreError> {
        Ok(&self.position(key)?.layers)
    }

    pub fn layers_mut(&mut self, key: &StockKey) -> Result<&mut Vec<CostLayer>, StoreError> {
        let position = self.position_mut(key)?;
        position.layers_dirty = true;
        Ok(&mut position.layers)
    }

    /// Sequence number for the next layer created under `key`.
    pub fn next_layer_sequence(&self, key: &StockKey) -> Result<u64, StoreError> {
        Ok(self
            .position(key)?
            .layers
            .iter()
            .map(CostLayer::sequence)
            .max()
            .map_or(1, |s| s + 1))
    }

    /// Stage a ledger entry. Its key must be leased.
    pub fn append(&mut self, tx: InventoryTransaction) -> Result<(), StoreError> {
        self.position(&tx.key)?;
        self.transactions.push(tx);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.transactions.is_empty()
            || self
                .positions
                .values()
                .any(|p| p.balance_dirty || p.layers_dirty)
    }

    /// Discard everything staged and release the lease.
    pub fn rollback(self) {}

    /// Split into the lease (keep it alive until the write is done), the
    /// per-key changes and the staged ledger entries.
    pub fn into_changes(self) -> (KeyLease, Vec<PositionChange>, Vec<InventoryTransaction>) {
        let changes = self
            .positions
            .into_iter()
            .filter(|(_, p)| p.balance_dirty || p.layers_dirty)
            .map(|(key, p)| PositionChange {
                key,
                expected: ExpectedVersion::observed(p.original.as_ref().map(|b| b.version())),
                before: p.original,
                balance: if p.balance_dirty { p.balance } else { None },
                layers: if p.layers_dirty { Some(p.layers) } else { None },
            })
            .collect();

        (self.lease, changes, self.transactions)
    }

    fn position(&self, key: &StockKey) -> Result<&StagedPosition, StoreError> {
        self.positions.get(key).ok_or(StoreError::NotLeased(*key))
    }

    fn position_mut(&mut self, key: &StockKey) -> Result<&mut StagedPosition, StoreError> {
        self.positions
            .get_mut(key)
            .ok_or(StoreError::NotLeased(*key))
    }
}
