//! Reference-data lookups (products, warehouses, locations).
//!
//! The engine only asks one question of these directories: does the id exist
//! and is it active? Maintenance of the directories happens elsewhere.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use stockbook_core::{DomainError, DomainResult, LocationId, ProductId, WarehouseId};
use stockbook_inventory::StockKey;

pub trait ReferenceDirectory<Id>: Send + Sync {
    fn exists_and_active(&self, id: &Id) -> bool;
}

impl<Id, D> ReferenceDirectory<Id> for Arc<D>
where
    D: ReferenceDirectory<Id> + ?Sized,
{
    fn exists_and_active(&self, id: &Id) -> bool {
        (**self).exists_and_active(id)
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug)]
pub struct InMemoryDirectory<Id> {
    entries: RwLock<HashMap<Id, bool>>,
}

impl<Id> Default for InMemoryDirectory<Id> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<Id> InMemoryDirectory<Id>
where
    Id: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as active.
    pub fn register(&self, id: Id) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id, true);
        }
    }

    pub fn deactivate(&self, id: &Id) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(active) = entries.get_mut(id) {
                *active = false;
            }
        }
    }
}

impl<Id> ReferenceDirectory<Id> for InMemoryDirectory<Id>
where
    Id: Clone + Eq + Hash + Send + Sync,
{
    fn exists_and_active(&self, id: &Id) -> bool {
        self.entries
            .read()
            .map(|entries| entries.get(id).copied().unwrap_or(false))
            .unwrap_or(false)
    }
}

/// The three directories a stock key is validated against.
#[derive(Clone)]
pub struct ReferenceDirectories {
    pub products: Arc<dyn ReferenceDirectory<ProductId>>,
    pub warehouses: Arc<dyn ReferenceDirectory<WarehouseId>>,
    pub locations: Arc<dyn ReferenceDirectory<LocationId>>,
}

impl core::fmt::Debug for ReferenceDirectories {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReferenceDirectories").finish_non_exhaustive()
    }
}

impl ReferenceDirectories {
    pub fn new(
        products: Arc<dyn ReferenceDirectory<ProductId>>,
        warehouses: Arc<dyn ReferenceDirectory<WarehouseId>>,
        locations: Arc<dyn ReferenceDirectory<LocationId>>,
    ) -> Self {
        Self {
            products,
            warehouses,
            locations,
        }
    }

    /// Fails with `InsufficientReferenceData` naming the first bad part of `key`.
    pub fn validate(&self, key: &StockKey) -> DomainResult<()> {
        if !self.products.exists_and_active(&key.product_id) {
            return Err(DomainError::reference_data(format!(
                "product {} is unknown or inactive",
                key.product_id
            )));
        }
        if !self.warehouses.exists_and_active(&key.warehouse_id) {
            return Err(DomainError::reference_data(format!(
                "warehouse {} is unknown or inactive",
                key.warehouse_id
            )));
        }
        if !self.locations.exists_and_active(&key.location_id) {
            return Err(DomainError::reference_data(format!(
                "location {} is unknown or inactive",
                key.location_id
            )));
        }
        Ok(())
    }
}
