//! Movement commands accepted by the accounting engine.
//!
//! Commands carry business time (`occurred_at`); the engine never reads the
//! clock itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{LocationId, ProductId, WarehouseId};

use crate::key::{DocumentRef, StockKey};

/// Command: RecordReceipt (goods received at a unit cost).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub key: StockKey,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub document: Option<DocumentRef>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordIssue (goods leaving stock, costed from layers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub key: StockKey,
    pub quantity: Decimal,
    pub document: Option<DocumentRef>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum AdjustmentDirection {
    /// Found stock, valued at `unit_cost`.
    In { unit_cost: Decimal },
    /// Lost or written-off stock.
    Out,
}

/// Command: AdjustStock (stock count corrections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub key: StockKey,
    pub quantity: Decimal,
    pub direction: AdjustmentDirection,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub document: Option<DocumentRef>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock / ReleaseReservation share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReservation {
    pub key: StockKey,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransferStock (same product, different warehouse/location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub source_warehouse: WarehouseId,
    pub source_location: LocationId,
    pub destination_warehouse: WarehouseId,
    pub destination_location: LocationId,
    pub quantity: Decimal,
    pub document: Option<DocumentRef>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TransferStock {
    pub fn source_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.source_warehouse, self.source_location)
    }

    pub fn destination_key(&self) -> StockKey {
        StockKey::new(
            self.product_id,
            self.destination_warehouse,
            self.destination_location,
        )
    }
}

/// Command: DeleteBalance (soft delete of an empty balance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBalance {
    pub key: StockKey,
    pub occurred_at: DateTime<Utc>,
}
