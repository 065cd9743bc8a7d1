//! Inventory accounting domain (balances, cost layers, ledger).
//!
//! This crate contains business rules for inventory quantity and cost
//! accounting, implemented purely as deterministic domain logic (no IO, no
//! locking, no storage).

pub mod balance;
pub mod commands;
pub mod cost_layer;
pub mod key;
pub mod notification;
pub mod transaction;
pub mod valuation;

pub use balance::{BalanceStatus, InventoryBalance};
pub use commands::{
    AdjustStock, AdjustmentDirection, ChangeReservation, DeleteBalance, RecordIssue,
    RecordReceipt, TransferStock,
};
pub use cost_layer::{
    Consumption, CostLayer, CostingMethod, LayerDraw, NewCostLayer, consume_layers,
    layered_quantity, layered_value,
};
pub use key::{DocumentRef, StockKey};
pub use notification::{InventoryLevelChanged, StockOperation};
pub use transaction::{InventoryTransaction, TransactionFilter, TransactionType};
pub use valuation::{Reconciliation, StockValuation};
