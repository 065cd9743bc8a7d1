//! Audit trail sink.
//!
//! One record per committed balance change. Failed operations are never audited.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockbook_core::UserId;
use stockbook_inventory::StockOperation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor: UserId,
    pub action: StockOperation,
    pub entity_type: String,
    pub entity_id: String,
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error>;
}

impl<A> AuditSink for Arc<A>
where
    A: AuditSink + ?Sized,
{
    type Error = A::Error;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        (**self).record(record)
    }
}

#[derive(Debug)]
pub enum InMemoryAuditError {
    Poisoned,
}

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditLog {
    type Error = InMemoryAuditError;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        self.records
            .lock()
            .map_err(|_| InMemoryAuditError::Poisoned)?
            .push(record);
        Ok(())
    }
}
