//! Infrastructure layer: transactional store, key locks, reference data,
//! audit trail, configuration and the accounting engine that ties them together.

pub mod audit;
pub mod config;
pub mod directory;
pub mod engine;
pub mod lock;
pub mod store;


pub use audit::{AuditRecord, AuditSink, InMemoryAuditError, InMemoryAuditLog};
pub use config::EngineConfig;
pub use directory::{InMemoryDirectory, ReferenceDirectories, ReferenceDirectory};
pub use engine::{EngineError, InventoryEngine, TransferReceipt};
pub use lock::{KeyLease, LockTable};
pub use store::{
    BalanceChange, CommitReceipt, InMemoryInventoryStore, InventoryStore, PositionChange,
    PositionSnapshot, StoreError, UnitOfWork,
};
