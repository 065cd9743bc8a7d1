//! Inventory persistence boundary.
//!
//! Balances, cost layers and ledger entries are only ever written together,
//! through a [`UnitOfWork`] that holds exclusive leases on the keys it touches.

pub mod in_memory;
pub mod r#trait;
pub mod unit_of_work;

pub use in_memory::InMemoryInventoryStore;
pub use r#trait::{BalanceChange, CommitReceipt, InventoryStore, StoreError};
pub use unit_of_work::{PositionChange, PositionSnapshot, UnitOfWork};
