use serde::{Deserialize, Serialize};

use stockbook_core::{LocationId, ProductId, ValueObject, WarehouseId};

/// Identity of one stock position: a product at a (warehouse, location).
///
/// Ordering is total and stable; multi-key operations lock keys in this order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId, location_id: LocationId) -> Self {
        Self {
            product_id,
            warehouse_id,
            location_id,
        }
    }
}

impl ValueObject for StockKey {}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.product_id, self.warehouse_id, self.location_id
        )
    }
}

/// Reference to the business document that caused a movement
/// (e.g. `goods_receipt` / `GR-2024-0001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl ValueObject for DocumentRef {}

impl core::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
