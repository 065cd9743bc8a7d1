//! Inventory accounting engine (application-level orchestration).
//!
//! The engine is the only writer of balances, cost layers and ledger entries.
//! Every operation runs the same pipeline:
//!
//! ```text
//! Command
//!   ↓
//! 1. Validate arguments and reference data (nothing locked, nothing staged)
//!   ↓
//! 2. Begin a unit of work (lease every key the operation touches)
//!   ↓
//! 3. Stage balance / layer / ledger changes (pure domain calls)
//!   ↓
//! 4. Commit (all-or-nothing, version-checked)
//!   ↓
//! 5. Audit + notify (best-effort, after commit)
//! ```
//!
//! Any error before the commit completes drops the unit of work, so storage never sees a
//! partial movement. Errors are logged with their context before being
//! returned.

use rust_decimal::Decimal;
use thiserror::Error;

use stockbook_core::{DomainError, UserId};
use stockbook_events::{Event, EventBus};
use stockbook_inventory::{
    AdjustStock, AdjustmentDirection, ChangeReservation, CostLayer, DeleteBalance,
    DocumentRef, InventoryBalance, InventoryLevelChanged, InventoryTransaction, NewCostLayer,
    Reconciliation, RecordIssue, RecordReceipt, StockKey, StockOperation, StockValuation,
    TransactionFilter, TransactionType, TransferStock, consume_layers,
};

use crate::audit::{AuditRecord, AuditSink};
use crate::config::EngineConfig;
use crate::directory::ReferenceDirectories;
use crate::store::{CommitReceipt, InventoryStore, StoreError, UnitOfWork};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// The domain error, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Store(_) => None,
        }
    }

    /// Stable machine-readable name of the failure, logged as `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Domain(e) => e.kind(),
            EngineError::Store(StoreError::Concurrency(_)) => "concurrency",
            EngineError::Store(StoreError::LockTimeout(_)) => "lock_timeout",
            EngineError::Store(StoreError::NotLeased(_)) => "not_leased",
            EngineError::Store(StoreError::Poisoned(_)) => "poisoned",
        }
    }

    /// Whether re-running the operation may succeed (lost a race or timed out).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::Concurrency(_) | StoreError::LockTimeout(_))
                | EngineError::Domain(DomainError::Conflict(_))
        )
    }
}

/// Both legs of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub outbound: InventoryTransaction,
    pub inbound: InventoryTransaction,
}

struct Inflow {
    kind: TransactionType,
    key: StockKey,
    quantity: Decimal,
    unit_cost: Decimal,
    lot: Option<String>,
    serial: Option<String>,
    document: Option<DocumentRef>,
    notes: Option<String>,
    counterpart: Option<StockKey>,
    at: chrono::DateTime<chrono::Utc>,
}

struct Outflow {
    kind: TransactionType,
    key: StockKey,
    quantity: Decimal,
    document: Option<DocumentRef>,
    notes: Option<String>,
    counterpart: Option<StockKey>,
    at: chrono::DateTime<chrono::Utc>,
}

/// Inventory quantity and cost-layer accounting engine.
///
/// Generic over its collaborators so tests run against in-memory
/// implementations:
/// - `S`: transactional store
/// - `B`: bus for [`InventoryLevelChanged`] notifications
/// - `A`: audit sink
pub struct InventoryEngine<S, B, A> {
    store: S,
    bus: B,
    audit: A,
    directories: ReferenceDirectories,
    config: EngineConfig,
}

impl<S, B, A> core::fmt::Debug for InventoryEngine<S, B, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, B, A> InventoryEngine<S, B, A>
where
    S: InventoryStore,
    B: EventBus<InventoryLevelChanged>,
    A: AuditSink,
{
    pub fn new(
        store: S,
        bus: B,
        audit: A,
        directories: ReferenceDirectories,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            bus,
            audit,
            directories,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Goods received into `cmd.key` at `cmd.unit_cost`.
    pub fn record_receipt(
        &self,
        actor: UserId,
        cmd: RecordReceipt,
    ) -> Result<InventoryTransaction, EngineError> {
        let key = cmd.key;
        let quantity = cmd.quantity;
        self.run(StockOperation::Receipt, key, quantity, actor, || {
            ensure_positive(cmd.quantity)?;
            ensure_cost(cmd.unit_cost)?;
            self.directories.validate(&cmd.key)?;

            let mut uow = self.store.begin(&[cmd.key])?;
            let tx = self.stage_inflow(
                &mut uow,
                actor,
                Inflow {
                    kind: TransactionType::Receipt,
                    key: cmd.key,
                    quantity: cmd.quantity,
                    unit_cost: cmd.unit_cost,
                    lot: cmd.lot,
                    serial: cmd.serial,
                    document: cmd.document,
                    notes: cmd.notes,
                    counterpart: None,
                    at: cmd.occurred_at,
                },
            )?;
            Ok((tx, uow))
        })
        .map(|(tx, _)| tx)
    }

    /// Goods leaving `cmd.key`, costed from its layers.
    pub fn record_issue(
        &self,
        actor: UserId,
        cmd: RecordIssue,
    ) -> Result<InventoryTransaction, EngineError> {
        let key = cmd.key;
        let quantity = cmd.quantity;
        self.run(StockOperation::Issue, key, quantity, actor, || {
            ensure_positive(cmd.quantity)?;

            let mut uow = self.store.begin(&[cmd.key])?;
            let tx = self.stage_outflow(
                &mut uow,
                actor,
                Outflow {
                    kind: TransactionType::Issue,
                    key: cmd.key,
                    quantity: cmd.quantity,
                    document: cmd.document,
                    notes: cmd.notes,
                    counterpart: None,
                    at: cmd.occurred_at,
                },
            )?;
            Ok((tx, uow))
        })
        .map(|(tx, _)| tx)
    }

    /// Stock-count correction in either direction.
    pub fn adjust(
        &self,
        actor: UserId,
        cmd: AdjustStock,
    ) -> Result<InventoryTransaction, EngineError> {
        let key = cmd.key;
        let quantity = cmd.quantity;
        let operation = match cmd.direction {
            AdjustmentDirection::In { .. } => StockOperation::AdjustmentIn,
            AdjustmentDirection::Out => StockOperation::AdjustmentOut,
        };
        self.run(operation, key, quantity, actor, || {
            // Zero-quantity adjustments are rejected like any other movement.
            ensure_positive(cmd.quantity)?;

            match cmd.direction {
                AdjustmentDirection::In { unit_cost } => {
                    ensure_cost(unit_cost)?;
                    self.directories.validate(&cmd.key)?;

                    let mut uow = self.store.begin(&[cmd.key])?;
                    let tx = self.stage_inflow(
                        &mut uow,
                        actor,
                        Inflow {
                            kind: TransactionType::AdjustmentIn,
                            key: cmd.key,
                            quantity: cmd.quantity,
                            unit_cost,
                            lot: cmd.lot,
                            serial: cmd.serial,
                            document: cmd.document,
                            notes: cmd.notes,
                            counterpart: None,
                            at: cmd.occurred_at,
                        },
                    )?;
                    Ok((tx, uow))
                }
                AdjustmentDirection::Out => {
                    let mut uow = self.store.begin(&[cmd.key])?;
                    let tx = self.stage_outflow(
                        &mut uow,
                        actor,
                        Outflow {
                            kind: TransactionType::AdjustmentOut,
                            key: cmd.key,
                            quantity: cmd.quantity,
                            document: cmd.document,
                            notes: cmd.notes,
                            counterpart: None,
                            at: cmd.occurred_at,
                        },
                    )?;
                    Ok((tx, uow))
                }
            }
        })
        .map(|(tx, _)| tx)
    }

    pub fn reserve(
        &self,
        actor: UserId,
        cmd: ChangeReservation,
    ) -> Result<InventoryBalance, EngineError> {
        self.change_reservation(actor, cmd, StockOperation::Reserve)
    }

    pub fn unreserve(
        &self,
        actor: UserId,
        cmd: ChangeReservation,
    ) -> Result<InventoryBalance, EngineError> {
        self.change_reservation(actor, cmd, StockOperation::Unreserve)
    }

    /// Move stock between two locations of the same product as one unit of work.
    pub fn transfer(
        &self,
        actor: UserId,
        cmd: TransferStock,
    ) -> Result<TransferReceipt, EngineError> {
        let source = cmd.source_key();
        let destination = cmd.destination_key();
        let quantity = cmd.quantity;
        self.run(StockOperation::TransferOut, source, quantity, actor, || {
            ensure_positive(cmd.quantity)?;
            if source == destination {
                return Err(DomainError::not_allowed(format!(
                    "transfer source and destination are both {source}"
                ))
                .into());
            }

            let mut uow = self.store.begin(&[source, destination])?;
            let outbound = self.stage_outflow(
                &mut uow,
                actor,
                Outflow {
                    kind: TransactionType::TransferOut,
                    key: source,
                    quantity: cmd.quantity,
                    document: cmd.document.clone(),
                    notes: cmd.notes.clone(),
                    counterpart: Some(destination),
                    at: cmd.occurred_at,
                },
            )?;

            // A failure from here on drops `uow` and with it the outbound leg.
            self.directories.validate(&destination)?;
            let inbound = self.stage_inflow(
                &mut uow,
                actor,
                Inflow {
                    kind: TransactionType::TransferIn,
                    key: destination,
                    quantity: cmd.quantity,
                    unit_cost: outbound.unit_cost,
                    lot: outbound.lot.clone(),
                    serial: outbound.serial.clone(),
                    document: cmd.document,
                    notes: cmd.notes,
                    counterpart: Some(source),
                    at: cmd.occurred_at,
                },
            )?;

            Ok((TransferReceipt { outbound, inbound }, uow))
        })
        .map(|(receipt, _)| receipt)
    }

    /// Soft-delete an empty balance.
    pub fn delete_balance(
        &self,
        actor: UserId,
        cmd: DeleteBalance,
    ) -> Result<InventoryBalance, EngineError> {
        let key = cmd.key;
        self.run(StockOperation::Delete, key, Decimal::ZERO, actor, || {
            let mut uow = self.store.begin(&[cmd.key])?;
            let mut balance = uow
                .balance(&cmd.key)?
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("balance {}", cmd.key)))?;
            balance.soft_delete(cmd.occurred_at)?;
            uow.put_balance(balance.clone())?;
            Ok((balance, uow))
        })
        .map(|(balance, receipt)| committed_balance(balance, &receipt))
    }

    pub fn balance(&self, key: &StockKey) -> Result<Option<InventoryBalance>, EngineError> {
        Ok(self.store.balance(key)?)
    }

    pub fn cost_layers(&self, key: &StockKey) -> Result<Vec<CostLayer>, EngineError> {
        Ok(self.store.cost_layers(key)?)
    }

    pub fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, EngineError> {
        Ok(self.store.transactions(filter)?)
    }

    pub fn valuation(&self, key: &StockKey) -> Result<StockValuation, EngineError> {
        let balance = self.store.balance(key)?;
        let layers = self.store.cost_layers(key)?;
        Ok(StockValuation::compute(*key, balance.as_ref(), &layers)?)
    }

    /// Compare on-hand with what the layers still hold.
    pub fn reconcile(&self, key: &StockKey) -> Result<Reconciliation, EngineError> {
        let balance = self.store.balance(key)?;
        let layers = self.store.cost_layers(key)?;
        let rec = Reconciliation::compute(*key, balance.as_ref(), &layers)?;
        if !rec.is_consistent() {
            tracing::warn!(
                key = %key,
                on_hand = %rec.on_hand,
                layered = %rec.layered_quantity,
                drift = %rec.drift,
                "balance and cost layers have diverged"
            );
        }
        Ok(rec)
    }

    fn change_reservation(
        &self,
        actor: UserId,
        cmd: ChangeReservation,
        operation: StockOperation,
    ) -> Result<InventoryBalance, EngineError> {
        let key = cmd.key;
        let quantity = cmd.quantity;
        self.run(operation, key, quantity, actor, || {
            ensure_positive(cmd.quantity)?;

            let mut uow = self.store.begin(&[cmd.key])?;
            let mut balance = uow
                .balance(&cmd.key)?
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("balance {}", cmd.key)))?;
            if operation == StockOperation::Reserve {
                balance.reserve(cmd.quantity, cmd.occurred_at)?;
            } else {
                balance.unreserve(cmd.quantity, cmd.occurred_at)?;
            }
            uow.put_balance(balance.clone())?;
            Ok((balance, uow))
        })
        .map(|(balance, receipt)| committed_balance(balance, &receipt))
    }

    /// Shared pipeline: stage, commit, then audit/notify. Failures are logged
    /// with the operation context before being returned.
    fn run<T, F>(
        &self,
        operation: StockOperation,
        key: StockKey,
        quantity: Decimal,
        actor: UserId,
        stage: F,
    ) -> Result<(T, CommitReceipt), EngineError>
    where
        F: FnOnce() -> Result<(T, UnitOfWork), EngineError>,
    {
        let result = stage().and_then(|(value, uow)| Ok((value, self.store.commit(uow)?)));

        match result {
            Ok((value, receipt)) => {
                tracing::info!(
                    operation = %operation,
                    key = %key,
                    quantity = %quantity,
                    actor = %actor,
                    ledger_entries = receipt.transactions.len(),
                    "inventory operation committed"
                );
                self.after_commit(actor, operation, &receipt);
                Ok((value, receipt))
            }
            Err(err) => {
                tracing::warn!(
                    operation = %operation,
                    key = %key,
                    quantity = %quantity,
                    actor = %actor,
                    error_kind = err.kind(),
                    error = %err,
                    "inventory operation failed"
                );
                Err(err)
            }
        }
    }

    fn stage_inflow(
        &self,
        uow: &mut UnitOfWork,
        actor: UserId,
        inflow: Inflow,
    ) -> Result<InventoryTransaction, EngineError> {
        let key = inflow.key;
        let mut balance = uow.balance(&key)?.cloned().unwrap_or_else(|| {
            InventoryBalance::open(key, inflow.lot.clone(), inflow.serial.clone(), inflow.at)
        });
        balance.receive(inflow.quantity, inflow.unit_cost, inflow.at)?;

        let mut tx = InventoryTransaction::new(
            inflow.kind,
            key,
            inflow.quantity,
            inflow.unit_cost,
            inflow.at,
            actor,
        )?
        .with_document(inflow.document.clone())
        .with_tracking(inflow.lot.clone(), inflow.serial.clone())
        .with_notes(inflow.notes);
        if let Some(counterpart) = inflow.counterpart {
            tx = tx.with_counterpart(counterpart);
        }

        let layer = CostLayer::new(NewCostLayer {
            key,
            sequence: uow.next_layer_sequence(&key)?,
            quantity: inflow.quantity,
            unit_cost: inflow.unit_cost,
            receipt_date: inflow.at,
            lot: inflow.lot,
            serial: inflow.serial,
            source_transaction: tx.id,
            document: inflow.document,
        })?;

        uow.put_balance(balance)?;
        uow.layers_mut(&key)?.push(layer);
        uow.append(tx.clone())?;
        Ok(tx)
    }

    fn stage_outflow(
        &self,
        uow: &mut UnitOfWork,
        actor: UserId,
        outflow: Outflow,
    ) -> Result<InventoryTransaction, EngineError> {
        let key = outflow.key;
        let mut balance = uow
            .balance(&key)?
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("balance {key}")))?;
        balance.issue(outflow.quantity, outflow.at)?;

        let consumption = consume_layers(
            uow.layers_mut(&key)?,
            outflow.quantity,
            self.config.costing_method,
        )?;
        let unit_cost = consumption.unit_cost()?;
        tracing::debug!(
            key = %key,
            layers = consumption.draws.len(),
            unit_cost = %unit_cost,
            method = %self.config.costing_method,
            "cost layers consumed"
        );

        let mut tx = InventoryTransaction::new(
            outflow.kind,
            key,
            outflow.quantity,
            unit_cost,
            outflow.at,
            actor,
        )?
        .with_document(outflow.document)
        .with_tracking(
            balance.lot().map(str::to_string),
            balance.serial().map(str::to_string),
        )
        .with_notes(outflow.notes);
        if let Some(counterpart) = outflow.counterpart {
            tx = tx.with_counterpart(counterpart);
        }

        uow.put_balance(balance)?;
        uow.append(tx.clone())?;
        Ok(tx)
    }

    fn after_commit(&self, actor: UserId, fallback: StockOperation, receipt: &CommitReceipt) {
        // Announce in ledger order (transfer out before transfer in).
        let mut changes: Vec<_> = receipt.balances.iter().collect();
        changes.sort_by_key(|c| {
            receipt
                .transactions
                .iter()
                .position(|tx| tx.key == c.after.key())
                .unwrap_or(usize::MAX)
        });

        for change in changes {
            let key = change.after.key();
            let tx = receipt.transactions.iter().find(|tx| tx.key == key);
            let operation = tx.map_or(fallback, |tx| StockOperation::from(tx.kind));
            let occurred_at = change.after.updated_at();

            let note = match tx {
                Some(tx) => match &tx.document {
                    Some(doc) => format!("{} {} @ {} ({doc})", tx.kind, tx.quantity, tx.unit_cost),
                    None => format!("{} {} @ {}", tx.kind, tx.quantity, tx.unit_cost),
                },
                None => format!(
                    "{operation}: reserved {} -> {}",
                    change.before.as_ref().map(InventoryBalance::reserved).unwrap_or_default(),
                    change.after.reserved()
                ),
            };

            let record = AuditRecord {
                actor,
                action: operation,
                entity_type: "inventory_balance".to_string(),
                entity_id: key.to_string(),
                before: change
                    .before
                    .as_ref()
                    .and_then(|b| serde_json::to_value(b).ok()),
                after: serde_json::to_value(&change.after).ok(),
                note,
                recorded_at: occurred_at,
            };
            if let Err(e) = self.audit.record(record) {
                tracing::warn!(key = %key, operation = %operation, error = ?e, "audit record dropped");
            }

            let event = InventoryLevelChanged::between(
                change.before.as_ref(),
                &change.after,
                operation,
                occurred_at,
            );
            let topic = event.topic();
            if let Err(e) = self.bus.publish(event) {
                tracing::warn!(key = %key, topic = %topic, error = ?e, "notification dropped");
            }
        }
    }
}

/// The balance as written (version advanced), falling back to the staged copy.
fn committed_balance(staged: InventoryBalance, receipt: &CommitReceipt) -> InventoryBalance {
    receipt
        .balances
        .iter()
        .find(|c| c.after.key() == staged.key())
        .map(|c| c.after.clone())
        .unwrap_or(staged)
}

fn ensure_positive(quantity: Decimal) -> Result<(), DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

fn ensure_cost(unit_cost: Decimal) -> Result<(), DomainError> {
    if unit_cost < Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "unit cost cannot be negative (got {unit_cost})"
        )));
    }
    Ok(())
}
