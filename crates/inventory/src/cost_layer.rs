//! Cost layers and the layer consumption algorithm.
//!
//! Every inflow creates a layer at its own unit cost. Outflows draw layers down
//! in costing order (FIFO by default) and are costed at the weighted cost of
//! the slices they drew.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, LayerId, TransactionId};

use crate::balance::{ensure_positive, overflow};
use crate::key::{DocumentRef, StockKey};

/// Order in which layers are consumed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostingMethod {
    /// Oldest receipt first.
    #[default]
    Fifo,
    /// Newest receipt first.
    Lifo,
}

impl core::str::FromStr for CostingMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            other => Err(DomainError::invalid_state(format!(
                "unknown costing method: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for CostingMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Fifo => f.write_str("fifo"),
            Self::Lifo => f.write_str("lifo"),
        }
    }
}

/// A batch of stock received at one unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLayer {
    id: LayerId,
    key: StockKey,
    /// Creation order within the key; breaks receipt-date ties.
    sequence: u64,
    lot: Option<String>,
    serial: Option<String>,
    original_quantity: Decimal,
    unit_cost: Decimal,
    receipt_date: DateTime<Utc>,
    remaining_quantity: Decimal,
    source_transaction: TransactionId,
    document: Option<DocumentRef>,
}

/// Input for [`CostLayer::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCostLayer {
    pub key: StockKey,
    pub sequence: u64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub receipt_date: DateTime<Utc>,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub source_transaction: TransactionId,
    pub document: Option<DocumentRef>,
}

impl CostLayer {
    pub fn new(input: NewCostLayer) -> DomainResult<Self> {
        ensure_positive(input.quantity)?;
        if input.unit_cost < Decimal::ZERO {
            return Err(DomainError::invalid_quantity(format!(
                "unit cost cannot be negative (got {})",
                input.unit_cost
            )));
        }
        input
            .quantity
            .checked_mul(input.unit_cost)
            .ok_or_else(|| overflow("layer value"))?;

        Ok(Self {
            id: LayerId::new(),
            key: input.key,
            sequence: input.sequence,
            lot: input.lot,
            serial: input.serial,
            original_quantity: input.quantity,
            unit_cost: input.unit_cost,
            receipt_date: input.receipt_date,
            remaining_quantity: input.quantity,
            source_transaction: input.source_transaction,
            document: input.document,
        })
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn lot(&self) -> Option<&str> {
        self.lot.as_deref()
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn original_quantity(&self) -> Decimal {
        self.original_quantity
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn receipt_date(&self) -> DateTime<Utc> {
        self.receipt_date
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.remaining_quantity
    }

    pub fn source_transaction(&self) -> TransactionId {
        self.source_transaction
    }

    pub fn document(&self) -> Option<&DocumentRef> {
        self.document.as_ref()
    }

    /// Exhausted layers stay around for audit.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity.is_zero()
    }

    /// Value of what is left in this layer.
    pub fn remaining_value(&self) -> DomainResult<Decimal> {
        self.remaining_quantity
            .checked_mul(self.unit_cost)
            .ok_or_else(|| overflow("layer value"))
    }
}

impl Entity for CostLayer {
    type Id = LayerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One slice taken from a single layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDraw {
    pub layer_id: LayerId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Result of consuming layers for one outflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumption {
    pub draws: Vec<LayerDraw>,
    pub quantity: Decimal,
    pub total_cost: Decimal,
}

impl Consumption {
    /// Weighted unit cost of the consumed slices.
    pub fn unit_cost(&self) -> DomainResult<Decimal> {
        if self.quantity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.total_cost
            .checked_div(self.quantity)
            .ok_or_else(|| overflow("unit cost"))
    }
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>, what: &str) -> DomainResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| overflow(what))
}

/// Sum of remaining quantity across `layers`.
pub fn layered_quantity(layers: &[CostLayer]) -> DomainResult<Decimal> {
    checked_sum(layers.iter().map(CostLayer::remaining_quantity), "layered quantity")
}

/// Sum of remaining value across `layers`.
pub fn layered_value(layers: &[CostLayer]) -> DomainResult<Decimal> {
    layers.iter().try_fold(Decimal::ZERO, |acc, layer| {
        acc.checked_add(layer.remaining_value()?)
            .ok_or_else(|| overflow("layered value"))
    })
}

/// Draw `quantity` units from `layers` in `method` order.
///
/// All-or-nothing: when the open layers cannot cover `quantity` this fails with
/// `InsufficientCostLayers` and no layer is touched. The draws are planned and
/// costed before any layer is drawn down, so an overflowing cost also leaves
/// the layers as they were.
pub fn consume_layers(
    layers: &mut [CostLayer],
    quantity: Decimal,
    method: CostingMethod,
) -> DomainResult<Consumption> {
    ensure_positive(quantity)?;

    let mut open: Vec<usize> = layers
        .iter()
        .enumerate()
        .filter(|(_, l)| l.remaining_quantity > Decimal::ZERO)
        .map(|(idx, _)| idx)
        .collect();

    let available = checked_sum(
        open.iter().map(|&i| layers[i].remaining_quantity),
        "layered quantity",
    )?;
    if available < quantity {
        return Err(DomainError::insufficient_layers(quantity, available));
    }

    open.sort_by_key(|&i| (layers[i].receipt_date, layers[i].sequence));
    if method == CostingMethod::Lifo {
        open.reverse();
    }

    let mut plan = Vec::new();
    let mut consumption = Consumption::default();
    let mut still_needed = quantity;
    for idx in open {
        if still_needed.is_zero() {
            break;
        }
        let layer = &layers[idx];
        let taken = still_needed.min(layer.remaining_quantity);
        still_needed -= taken;

        let cost = taken
            .checked_mul(layer.unit_cost)
            .ok_or_else(|| overflow("issue cost"))?;
        consumption.total_cost = consumption
            .total_cost
            .checked_add(cost)
            .ok_or_else(|| overflow("issue cost"))?;
        consumption.quantity += taken;
        consumption.draws.push(LayerDraw {
            layer_id: layer.id,
            quantity: taken,
            unit_cost: layer.unit_cost,
        });
        plan.push((idx, taken));
    }
    consumption.unit_cost()?;

    for (idx, taken) in plan {
        layers[idx].remaining_quantity -= taken;
    }
    Ok(consumption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use stockbook_core::{LocationId, ProductId, WarehouseId};

    fn test_key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new(), LocationId::new())
    }

    fn layer(key: StockKey, sequence: u64, quantity: Decimal, unit_cost: Decimal) -> CostLayer {
        let base = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        CostLayer::new(NewCostLayer {
            key,
            sequence,
            quantity,
            unit_cost,
            receipt_date: base + Duration::days(sequence as i64),
            lot: None,
            serial: None,
            source_transaction: TransactionId::new(),
            document: None,
        })
        .unwrap()
    }

    #[test]
    fn fifo_consumes_oldest_layer_first() {
        let key = test_key();
        let mut layers = vec![layer(key, 1, dec!(50), dec!(10)), layer(key, 2, dec!(50), dec!(20))];

        let consumption = consume_layers(&mut layers, dec!(70), CostingMethod::Fifo).unwrap();

        assert_eq!(layers[0].remaining_quantity(), dec!(0));
        assert!(layers[0].is_exhausted());
        assert_eq!(layers[1].remaining_quantity(), dec!(30));
        assert_eq!(consumption.quantity, dec!(70));
        assert_eq!(consumption.total_cost, dec!(900));
        assert_eq!(consumption.unit_cost().unwrap().round_dp(2), dec!(12.86));
        assert_eq!(consumption.draws.len(), 2);
    }

    #[test]
    fn lifo_consumes_newest_layer_first() {
        let key = test_key();
        let mut layers = vec![layer(key, 1, dec!(50), dec!(10)), layer(key, 2, dec!(50), dec!(20))];

        let consumption = consume_layers(&mut layers, dec!(70), CostingMethod::Lifo).unwrap();

        assert_eq!(layers[0].remaining_quantity(), dec!(30));
        assert_eq!(layers[1].remaining_quantity(), dec!(0));
        assert_eq!(consumption.total_cost, dec!(1200));
    }

    #[test]
    fn ordering_follows_receipt_date_not_slice_position() {
        let key = test_key();
        // Stored newest-first; FIFO must still start with sequence 1.
        let mut layers = vec![layer(key, 2, dec!(5), dec!(2)), layer(key, 1, dec!(5), dec!(1))];

        let consumption = consume_layers(&mut layers, dec!(5), CostingMethod::Fifo).unwrap();

        assert_eq!(consumption.unit_cost().unwrap(), dec!(1));
        assert_eq!(layers[0].remaining_quantity(), dec!(5));
        assert_eq!(layers[1].remaining_quantity(), dec!(0));
    }

    #[test]
    fn exhausted_layers_are_skipped() {
        let key = test_key();
        let mut layers = vec![layer(key, 1, dec!(5), dec!(1)), layer(key, 2, dec!(5), dec!(3))];
        consume_layers(&mut layers, dec!(5), CostingMethod::Fifo).unwrap();
        let untouched = layers[1].clone();

        let consumption = consume_layers(&mut layers, dec!(2), CostingMethod::Fifo).unwrap();
        assert_eq!(consumption.draws.len(), 1);
        assert_eq!(consumption.draws[0].layer_id, *layers[1].id());
        assert_eq!(consumption.unit_cost().unwrap(), dec!(3));

        // Same layer, less left in it.
        assert!(layers[1].same_identity(&untouched));
        assert_ne!(layers[1], untouched);
    }

    #[test]
    fn shortfall_fails_without_touching_layers() {
        let key = test_key();
        let mut layers = vec![layer(key, 1, dec!(5), dec!(1)), layer(key, 2, dec!(5), dec!(3))];
        let before = layers.clone();

        let err = consume_layers(&mut layers, dec!(11), CostingMethod::Fifo).unwrap_err();

        assert_eq!(err, DomainError::insufficient_layers(dec!(11), dec!(10)));
        assert_eq!(layers, before);
    }

    #[test]
    fn overflowing_issue_cost_fails_without_touching_layers() {
        let key = test_key();
        let big = dec!(50000000000000000000000000000);
        let mut layers = vec![layer(key, 1, dec!(1), big), layer(key, 2, dec!(1), big)];
        let before = layers.clone();

        let err = consume_layers(&mut layers, dec!(2), CostingMethod::Fifo).unwrap_err();

        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(layers, before);
        assert!(layered_value(&layers).is_err());
    }

    #[test]
    fn layer_whose_value_overflows_is_rejected() {
        let err = CostLayer::new(NewCostLayer {
            key: test_key(),
            sequence: 1,
            quantity: dec!(100000000000000000),
            unit_cost: dec!(1000000000000000),
            receipt_date: Utc::now(),
            lot: None,
            serial: None,
            source_transaction: TransactionId::new(),
            document: None,
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let mut layers = vec![layer(test_key(), 1, dec!(5), dec!(1))];
        let err = consume_layers(&mut layers, dec!(0), CostingMethod::Fifo).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn costing_method_parses_case_insensitively() {
        assert_eq!("FIFO".parse::<CostingMethod>().unwrap(), CostingMethod::Fifo);
        assert_eq!("lifo".parse::<CostingMethod>().unwrap(), CostingMethod::Lifo);
        assert!("hifo".parse::<CostingMethod>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: consumption conserves quantity and never leaves a layer negative.
        #[test]
        fn consumption_conserves_quantity(
            sizes in prop::collection::vec(1u32..500u32, 1..8),
            costs in prop::collection::vec(0u32..10_000u32, 8),
            take_pct in 1u32..=100u32,
            lifo in any::<bool>(),
        ) {
            let key = test_key();
            let mut layers: Vec<CostLayer> = sizes
                .iter()
                .enumerate()
                .map(|(i, &q)| layer(key, i as u64, Decimal::from(q), Decimal::new(costs[i] as i64, 2)))
                .collect();

            let before = layered_quantity(&layers).unwrap();
            let wanted = (before * Decimal::from(take_pct) / dec!(100)).floor().max(dec!(1));
            let method = if lifo { CostingMethod::Lifo } else { CostingMethod::Fifo };

            let consumption = consume_layers(&mut layers, wanted, method).unwrap();

            prop_assert_eq!(consumption.quantity, wanted);
            prop_assert_eq!(layered_quantity(&layers).unwrap(), before - wanted);
            prop_assert!(layers.iter().all(|l| l.remaining_quantity() >= Decimal::ZERO));
            let drawn: Decimal = consumption.draws.iter().map(|d| d.quantity * d.unit_cost).sum();
            prop_assert_eq!(drawn, consumption.total_cost);
        }
    }
}
