//! Read-side figures derived from a balance and its layers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::DomainResult;

use crate::balance::{InventoryBalance, overflow};
use crate::cost_layer::{CostLayer, layered_quantity, layered_value};
use crate::key::StockKey;

/// Value of one stock position under both costing views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockValuation {
    pub key: StockKey,
    pub on_hand: Decimal,
    /// Σ remaining × layer cost (authoritative).
    pub layered_value: Decimal,
    pub average_unit_cost: Decimal,
    /// on_hand × moving average (reporting only).
    pub average_value: Decimal,
}

impl StockValuation {
    pub fn compute(
        key: StockKey,
        balance: Option<&InventoryBalance>,
        layers: &[CostLayer],
    ) -> DomainResult<Self> {
        let on_hand = balance.map(InventoryBalance::on_hand).unwrap_or_default();
        let average_unit_cost = balance
            .map(InventoryBalance::average_unit_cost)
            .unwrap_or_default();
        let average_value = on_hand
            .checked_mul(average_unit_cost)
            .ok_or_else(|| overflow("average value"))?;
        Ok(Self {
            key,
            on_hand,
            layered_value: layered_value(layers)?,
            average_unit_cost,
            average_value,
        })
    }
}

/// Comparison of on-hand against what the layers still hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub key: StockKey,
    pub on_hand: Decimal,
    pub layered_quantity: Decimal,
    /// on_hand − layered_quantity; zero when consistent.
    pub drift: Decimal,
}

impl Reconciliation {
    pub fn compute(
        key: StockKey,
        balance: Option<&InventoryBalance>,
        layers: &[CostLayer],
    ) -> DomainResult<Self> {
        let on_hand = balance.map(InventoryBalance::on_hand).unwrap_or_default();
        let layered = layered_quantity(layers)?;
        Ok(Self {
            key,
            on_hand,
            layered_quantity: layered,
            drift: on_hand - layered,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_layer::{NewCostLayer, consume_layers, CostingMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockbook_core::{LocationId, ProductId, TransactionId, WarehouseId};

    fn setup() -> (StockKey, InventoryBalance, Vec<CostLayer>) {
        let key = StockKey::new(ProductId::new(), WarehouseId::new(), LocationId::new());
        let mut balance = InventoryBalance::open(key, None, None, Utc::now());
        let mut layers = Vec::new();
        for (seq, (q, c)) in [(dec!(50), dec!(10)), (dec!(50), dec!(20))].into_iter().enumerate() {
            balance.receive(q, c, Utc::now()).unwrap();
            layers.push(
                CostLayer::new(NewCostLayer {
                    key,
                    sequence: seq as u64,
                    quantity: q,
                    unit_cost: c,
                    receipt_date: Utc::now(),
                    lot: None,
                    serial: None,
                    source_transaction: TransactionId::new(),
                    document: None,
                })
                .unwrap(),
            );
        }
        (key, balance, layers)
    }

    #[test]
    fn layered_and_average_values_diverge_after_fifo_issue() {
        let (key, mut balance, mut layers) = setup();
        balance.issue(dec!(70), Utc::now()).unwrap();
        consume_layers(&mut layers, dec!(70), CostingMethod::Fifo).unwrap();

        let valuation = StockValuation::compute(key, Some(&balance), &layers).unwrap();
        assert_eq!(valuation.on_hand, dec!(30));
        assert_eq!(valuation.layered_value, dec!(600));
        assert_eq!(valuation.average_value, dec!(450));
    }

    #[test]
    fn reconciliation_reports_drift() {
        let (key, mut balance, layers) = setup();
        assert!(Reconciliation::compute(key, Some(&balance), &layers).unwrap().is_consistent());

        balance.issue(dec!(10), Utc::now()).unwrap();
        let rec = Reconciliation::compute(key, Some(&balance), &layers).unwrap();
        assert!(!rec.is_consistent());
        assert_eq!(rec.drift, dec!(-10));
    }

    #[test]
    fn missing_balance_values_at_zero() {
        let key = StockKey::new(ProductId::new(), WarehouseId::new(), LocationId::new());
        let valuation = StockValuation::compute(key, None, &[]).unwrap();
        assert_eq!(valuation.on_hand, dec!(0));
        assert_eq!(valuation.layered_value, dec!(0));
    }
}
