use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{AggregateRoot, DomainError, DomainResult};

use crate::key::StockKey;

/// Lifecycle status of a balance row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    Active,
    /// Soft-deleted; only reachable with zero on-hand and zero reserved.
    Deleted,
}

/// Aggregate root: total stock of one product at one (warehouse, location).
///
/// `available` is derived (`on_hand - reserved`) and recomputed by every
/// mutation; it is never set on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBalance {
    key: StockKey,
    on_hand: Decimal,
    reserved: Decimal,
    available: Decimal,
    average_unit_cost: Decimal,
    lot: Option<String>,
    serial: Option<String>,
    status: BalanceStatus,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InventoryBalance {
    /// A fresh, empty balance for `key` (not yet persisted, version 0).
    pub fn open(
        key: StockKey,
        lot: Option<String>,
        serial: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            on_hand: Decimal::ZERO,
            reserved: Decimal::ZERO,
            available: Decimal::ZERO,
            average_unit_cost: Decimal::ZERO,
            lot,
            serial,
            status: BalanceStatus::Active,
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn on_hand(&self) -> Decimal {
        self.on_hand
    }

    pub fn reserved(&self) -> Decimal {
        self.reserved
    }

    pub fn available(&self) -> Decimal {
        self.available
    }

    pub fn average_unit_cost(&self) -> Decimal {
        self.average_unit_cost
    }

    pub fn lot(&self) -> Option<&str> {
        self.lot.as_deref()
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn status(&self) -> BalanceStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == BalanceStatus::Active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Storage hook: a mutation of this balance was committed.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }

    /// Add stock at `unit_cost`, folding it into the moving average.
    ///
    /// Reactivates a soft-deleted balance.
    pub fn receive(
        &mut self,
        quantity: Decimal,
        unit_cost: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if unit_cost < Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "unit cost cannot be negative (got {unit_cost})"
            )));
        }

        let new_on_hand = self
            .on_hand
            .checked_add(quantity)
            .ok_or_else(|| overflow("on-hand quantity"))?;
        let held_value = self
            .on_hand
            .checked_mul(self.average_unit_cost)
            .ok_or_else(|| overflow("stock value"))?;
        let received_value = quantity
            .checked_mul(unit_cost)
            .ok_or_else(|| overflow("receipt value"))?;
        let average_unit_cost = held_value
            .checked_add(received_value)
            .and_then(|total| total.checked_div(new_on_hand))
            .ok_or_else(|| overflow("stock value"))?;

        self.average_unit_cost = average_unit_cost;
        self.on_hand = new_on_hand;
        self.status = BalanceStatus::Active;
        self.touch(at);
        Ok(())
    }

    /// Remove stock from on-hand.
    ///
    /// Reserved stock may be issued; if the issue eats into reservations they
    /// shrink with it so that `reserved <= on_hand` keeps holding.
    pub fn issue(&mut self, quantity: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        self.ensure_active()?;
        if self.on_hand < quantity {
            return Err(DomainError::insufficient_stock(quantity, self.on_hand));
        }

        self.on_hand -= quantity;
        if self.reserved > self.on_hand {
            self.reserved = self.on_hand;
        }
        self.touch(at);
        Ok(())
    }

    pub fn reserve(&mut self, quantity: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        self.ensure_active()?;
        if self.available < quantity {
            return Err(DomainError::insufficient_stock(quantity, self.available));
        }

        self.reserved += quantity;
        self.touch(at);
        Ok(())
    }

    pub fn unreserve(&mut self, quantity: Decimal, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(quantity)?;
        self.ensure_active()?;
        if quantity > self.reserved {
            return Err(DomainError::invalid_state(format!(
                "cannot unreserve {quantity}: only {} reserved",
                self.reserved
            )));
        }

        self.reserved -= quantity;
        self.touch(at);
        Ok(())
    }

    /// Soft-delete. Only an empty, unreserved balance may go.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        if !self.on_hand.is_zero() || !self.reserved.is_zero() {
            return Err(DomainError::not_allowed(format!(
                "balance {} still holds stock (on hand {}, reserved {})",
                self.key, self.on_hand, self.reserved
            )));
        }

        self.status = BalanceStatus::Deleted;
        self.touch(at);
        Ok(())
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("balance {}", self.key)))
        }
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.available = self.on_hand - self.reserved;
        self.updated_at = at;
    }
}

impl AggregateRoot for InventoryBalance {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

pub(crate) fn ensure_positive(quantity: Decimal) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

pub(crate) fn overflow(what: &str) -> DomainError {
    DomainError::invalid_quantity(format!("{what} overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockbook_core::{LocationId, ProductId, WarehouseId};

    fn test_key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new(), LocationId::new())
    }

    fn stocked(quantity: Decimal, unit_cost: Decimal) -> InventoryBalance {
        let mut balance = InventoryBalance::open(test_key(), None, None, Utc::now());
        balance.receive(quantity, unit_cost, Utc::now()).unwrap();
        balance
    }

    #[test]
    fn receipt_updates_weighted_average() {
        let mut balance = stocked(dec!(50), dec!(10));
        balance.receive(dec!(50), dec!(20), Utc::now()).unwrap();

        assert_eq!(balance.on_hand(), dec!(100));
        assert_eq!(balance.available(), dec!(100));
        assert_eq!(balance.average_unit_cost(), dec!(15));
    }

    #[test]
    fn first_receipt_takes_the_receipt_cost() {
        let balance = stocked(dec!(100), dec!(10));
        assert_eq!(balance.average_unit_cost(), dec!(10));
    }

    #[test]
    fn issue_keeps_average_and_recomputes_available() {
        let mut balance = stocked(dec!(100), dec!(10));
        balance.reserve(dec!(10), Utc::now()).unwrap();
        balance.issue(dec!(60), Utc::now()).unwrap();

        assert_eq!(balance.on_hand(), dec!(40));
        assert_eq!(balance.reserved(), dec!(10));
        assert_eq!(balance.available(), dec!(30));
        assert_eq!(balance.average_unit_cost(), dec!(10));
    }

    #[test]
    fn issue_beyond_on_hand_is_rejected_without_change() {
        let mut balance = stocked(dec!(5), dec!(1));
        let before = balance.clone();

        let err = balance.issue(dec!(6), Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(6), dec!(5)));
        assert_eq!(balance, before);
    }

    #[test]
    fn issuing_reserved_stock_shrinks_the_reservation() {
        let mut balance = stocked(dec!(10), dec!(1));
        balance.reserve(dec!(8), Utc::now()).unwrap();
        balance.issue(dec!(5), Utc::now()).unwrap();

        assert_eq!(balance.on_hand(), dec!(5));
        assert_eq!(balance.reserved(), dec!(5));
        assert_eq!(balance.available(), dec!(0));
    }

    #[test]
    fn reserve_respects_available_quantity() {
        let mut balance = stocked(dec!(10), dec!(1));
        balance.reserve(dec!(7), Utc::now()).unwrap();

        let err = balance.reserve(dec!(4), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(balance.reserved(), dec!(7));
    }

    #[test]
    fn unreserving_more_than_reserved_is_invalid_state() {
        let mut balance = stocked(dec!(10), dec!(1));
        balance.reserve(dec!(2), Utc::now()).unwrap();

        let err = balance.unreserve(dec!(3), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        balance.unreserve(dec!(2), Utc::now()).unwrap();
        assert_eq!(balance.reserved(), dec!(0));
        assert_eq!(balance.available(), dec!(10));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let mut balance = stocked(dec!(10), dec!(1));
        for q in [dec!(0), dec!(-1)] {
            assert!(matches!(balance.receive(q, dec!(1), Utc::now()), Err(DomainError::InvalidQuantity(_))));
            assert!(matches!(balance.issue(q, Utc::now()), Err(DomainError::InvalidQuantity(_))));
            assert!(matches!(balance.reserve(q, Utc::now()), Err(DomainError::InvalidQuantity(_))));
        }
    }

    #[test]
    fn negative_unit_cost_is_rejected() {
        let mut balance = InventoryBalance::open(test_key(), None, None, Utc::now());
        let err = balance.receive(dec!(1), dec!(-0.01), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(balance.on_hand(), dec!(0));
    }

    #[test]
    fn overflowing_receipt_is_rejected_without_change() {
        let mut balance = stocked(dec!(10), dec!(1));
        let before = balance.clone();

        let err = balance
            .receive(dec!(100000000000000000), dec!(1000000000000000), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(balance, before);

        let err = balance.receive(Decimal::MAX, dec!(0), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(balance, before);
    }

    #[test]
    fn soft_delete_requires_empty_balance() {
        let mut balance = stocked(dec!(1), dec!(1));
        let err = balance.soft_delete(Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::OperationNotAllowed(_)));

        balance.issue(dec!(1), Utc::now()).unwrap();
        balance.soft_delete(Utc::now()).unwrap();
        assert_eq!(balance.status(), BalanceStatus::Deleted);

        // Deleted balances behave as absent for outflows and reservations.
        assert!(matches!(balance.reserve(dec!(1), Utc::now()), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn receipt_reactivates_deleted_balance() {
        let mut balance = stocked(dec!(1), dec!(4));
        balance.issue(dec!(1), Utc::now()).unwrap();
        balance.soft_delete(Utc::now()).unwrap();

        balance.receive(dec!(3), dec!(2), Utc::now()).unwrap();
        assert!(balance.is_active());
        assert_eq!(balance.on_hand(), dec!(3));
        assert_eq!(balance.average_unit_cost(), dec!(2));
    }
}
