use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_events::Event;

use crate::balance::InventoryBalance;
use crate::key::StockKey;
use crate::transaction::TransactionType;

/// What changed a balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    Receipt,
    Issue,
    AdjustmentIn,
    AdjustmentOut,
    TransferIn,
    TransferOut,
    Reserve,
    Unreserve,
    Delete,
}

impl StockOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            StockOperation::Receipt => "receipt",
            StockOperation::Issue => "issue",
            StockOperation::AdjustmentIn => "adjustment_in",
            StockOperation::AdjustmentOut => "adjustment_out",
            StockOperation::TransferIn => "transfer_in",
            StockOperation::TransferOut => "transfer_out",
            StockOperation::Reserve => "reserve",
            StockOperation::Unreserve => "unreserve",
            StockOperation::Delete => "delete",
        }
    }
}

impl From<TransactionType> for StockOperation {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::Receipt => StockOperation::Receipt,
            TransactionType::Issue => StockOperation::Issue,
            TransactionType::AdjustmentIn => StockOperation::AdjustmentIn,
            TransactionType::AdjustmentOut => StockOperation::AdjustmentOut,
            TransactionType::TransferIn => StockOperation::TransferIn,
            TransactionType::TransferOut => StockOperation::TransferOut,
        }
    }
}

impl core::fmt::Display for StockOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification: a balance changed (emitted after commit, best-effort).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevelChanged {
    pub key: StockKey,
    pub operation: StockOperation,
    pub old_on_hand: Decimal,
    pub new_on_hand: Decimal,
    pub old_available: Decimal,
    pub new_available: Decimal,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryLevelChanged {
    /// Build from the balance as it was before and after the change.
    pub fn between(
        before: Option<&InventoryBalance>,
        after: &InventoryBalance,
        operation: StockOperation,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: after.key(),
            operation,
            old_on_hand: before.map(InventoryBalance::on_hand).unwrap_or_default(),
            new_on_hand: after.on_hand(),
            old_available: before.map(InventoryBalance::available).unwrap_or_default(),
            new_available: after.available(),
            occurred_at,
        }
    }
}

impl Event for InventoryLevelChanged {
    fn event_type(&self) -> &'static str {
        "inventory.level.changed"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
