//! Append-only ledger records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    DomainResult, Entity, LocationId, ProductId, TransactionId, UserId, WarehouseId,
};

use crate::balance::{ensure_positive, overflow};
use crate::key::{DocumentRef, StockKey};

/// Kind of stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Receipt,
    Issue,
    AdjustmentIn,
    AdjustmentOut,
    TransferIn,
    TransferOut,
}

impl TransactionType {
    /// Inflows create cost layers; outflows consume them.
    pub fn is_inflow(self) -> bool {
        matches!(
            self,
            TransactionType::Receipt | TransactionType::AdjustmentIn | TransactionType::TransferIn
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Receipt => "RECEIPT",
            TransactionType::Issue => "ISSUE",
            TransactionType::AdjustmentIn => "ADJUSTMENT_IN",
            TransactionType::AdjustmentOut => "ADJUSTMENT_OUT",
            TransactionType::TransferIn => "TRANSFER_IN",
            TransactionType::TransferOut => "TRANSFER_OUT",
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable stock movement.
///
/// Ledgers hand out clones; nothing ever writes back into a recorded entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub key: StockKey,
    pub kind: TransactionType,
    /// Always positive; direction comes from `kind`.
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub document: Option<DocumentRef>,
    pub notes: Option<String>,
    pub actor: UserId,
    /// The other side of a transfer.
    pub counterpart: Option<StockKey>,
}

impl InventoryTransaction {
    pub fn new(
        kind: TransactionType,
        key: StockKey,
        quantity: Decimal,
        unit_cost: Decimal,
        transaction_date: DateTime<Utc>,
        actor: UserId,
    ) -> DomainResult<Self> {
        ensure_positive(quantity)?;
        Ok(Self {
            id: TransactionId::new(),
            key,
            kind,
            quantity,
            unit_cost,
            transaction_date,
            lot: None,
            serial: None,
            document: None,
            notes: None,
            actor,
            counterpart: None,
        })
    }

    pub fn with_document(mut self, document: Option<DocumentRef>) -> Self {
        self.document = document;
        self
    }

    pub fn with_tracking(mut self, lot: Option<String>, serial: Option<String>) -> Self {
        self.lot = lot;
        self.serial = serial;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_counterpart(mut self, counterpart: StockKey) -> Self {
        self.counterpart = Some(counterpart);
        self
    }

    /// Quantity × unit cost.
    pub fn value(&self) -> DomainResult<Decimal> {
        self.quantity
            .checked_mul(self.unit_cost)
            .ok_or_else(|| overflow("transaction value"))
    }

    /// Signed effect on on-hand quantity.
    pub fn signed_quantity(&self) -> Decimal {
        if self.kind.is_inflow() {
            self.quantity
        } else {
            -self.quantity
        }
    }
}

impl Entity for InventoryTransaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Ledger query. Empty criteria match everything.
///
/// Date range is `[from, to)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub location_id: Option<LocationId>,
    pub kinds: Vec<TransactionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded against one stock key.
    pub fn for_key(key: StockKey) -> Self {
        Self::new()
            .product(key.product_id)
            .warehouse(key.warehouse_id)
            .location(key.location_id)
    }

    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn kind(mut self, kind: TransactionType) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, tx: &InventoryTransaction) -> bool {
        if self.product_id.is_some_and(|p| p != tx.key.product_id) {
            return false;
        }
        if self.warehouse_id.is_some_and(|w| w != tx.key.warehouse_id) {
            return false;
        }
        if self.location_id.is_some_and(|l| l != tx.key.location_id) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&tx.kind) {
            return false;
        }
        if self.from.is_some_and(|from| tx.transaction_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| tx.transaction_date >= to) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use stockbook_core::DomainError;

    fn test_key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new(), LocationId::new())
    }

    fn tx(kind: TransactionType, key: StockKey, at: DateTime<Utc>) -> InventoryTransaction {
        InventoryTransaction::new(kind, key, dec!(1), dec!(2), at, UserId::new()).unwrap()
    }

    #[test]
    fn quantity_must_be_positive() {
        let err = InventoryTransaction::new(
            TransactionType::Issue,
            test_key(),
            dec!(0),
            dec!(1),
            Utc::now(),
            UserId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn signed_quantity_follows_direction() {
        let key = test_key();
        assert_eq!(tx(TransactionType::TransferIn, key, Utc::now()).signed_quantity(), dec!(1));
        assert_eq!(tx(TransactionType::AdjustmentOut, key, Utc::now()).signed_quantity(), dec!(-1));
    }

    #[test]
    fn filter_by_key_kind_and_range() {
        let key = test_key();
        let other = test_key();
        let now = Utc::now();

        let receipt = tx(TransactionType::Receipt, key, now);
        let issue = tx(TransactionType::Issue, key, now + Duration::hours(1));
        let foreign = tx(TransactionType::Receipt, other, now);

        let by_key = TransactionFilter::for_key(key);
        assert!(by_key.matches(&receipt));
        assert!(by_key.matches(&issue));
        assert!(!by_key.matches(&foreign));

        let issues = TransactionFilter::for_key(key).kind(TransactionType::Issue);
        assert!(!issues.matches(&receipt));
        assert!(issues.matches(&issue));

        let first_hour = TransactionFilter::new().between(now, now + Duration::hours(1));
        assert!(first_hour.matches(&receipt));
        assert!(!first_hour.matches(&issue));
        assert!(first_hour.matches(&foreign));
    }

    #[test]
    fn type_serializes_in_ledger_notation() {
        let json = serde_json::to_string(&TransactionType::AdjustmentOut).unwrap();
        assert_eq!(json, "\"ADJUSTMENT_OUT\"");
    }
}
