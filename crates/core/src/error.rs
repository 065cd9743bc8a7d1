//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Storage and locking concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A quantity or cost argument was non-positive or otherwise malformed.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A referenced balance, layer or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested outflow or reservation exceeds what is on hand / available.
    #[error("insufficient stock (requested {requested}, available {available})")]
    InsufficientStock { requested: Decimal, available: Decimal },

    /// Balance and cost-layer quantities have diverged.
    #[error("insufficient cost layers (requested {requested}, layered {available})")]
    InsufficientCostLayers { requested: Decimal, available: Decimal },

    /// The operation does not fit the current state (e.g. unreserving too much).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation is refused by a business rule.
    #[error("operation not allowed: {0}")]
    OperationNotAllowed(String),

    /// A product, warehouse or location is unknown or inactive.
    #[error("insufficient reference data: {0}")]
    InsufficientReferenceData(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn insufficient_stock(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn insufficient_layers(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientCostLayers {
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::OperationNotAllowed(msg.into())
    }

    pub fn reference_data(msg: impl Into<String>) -> Self {
        Self::InsufficientReferenceData(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidQuantity(_) => "invalid_quantity",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::InsufficientCostLayers { .. } => "insufficient_cost_layers",
            DomainError::InvalidState(_) => "invalid_state",
            DomainError::OperationNotAllowed(_) => "operation_not_allowed",
            DomainError::InsufficientReferenceData(_) => "insufficient_reference_data",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidId(_) => "invalid_id",
        }
    }
}
