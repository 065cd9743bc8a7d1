//! Per-key exclusive leases.
//!
//! The balance row is the serialization point for its key: at most one unit of
//! work holds a key at a time. A lease is granted for a whole key set at once
//! (a transfer needs two), so acquisition never holds one key while waiting for
//! another and cannot deadlock.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use stockbook_inventory::StockKey;

use crate::store::StoreError;

#[derive(Debug, Default)]
struct LockState {
    held: Mutex<HashSet<StockKey>>,
    released: Condvar,
}

/// Table of currently leased keys. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct LockTable {
    state: Arc<LockState>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every key in `keys` is free, then lease them all.
    ///
    /// With `timeout = None` this waits indefinitely.
    pub fn acquire(
        &self,
        keys: &[StockKey],
        timeout: Option<Duration>,
    ) -> Result<KeyLease, StoreError> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut held = self
            .state
            .held
            .lock()
            .map_err(|_| StoreError::Poisoned("lock table".to_string()))?;

        while keys.iter().any(|k| held.contains(k)) {
            held = match deadline {
                None => self
                    .state
                    .released
                    .wait(held)
                    .map_err(|_| StoreError::Poisoned("lock table".to_string()))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(StoreError::LockTimeout(format!(
                            "gave up waiting for {} key(s) after {:?}",
                            keys.len(),
                            timeout.unwrap_or_default()
                        )));
                    }
                    let (guard, _) = self
                        .state
                        .released
                        .wait_timeout(held, deadline - now)
                        .map_err(|_| StoreError::Poisoned("lock table".to_string()))?;
                    guard
                }
            };
        }

        held.extend(keys.iter().copied());
        drop(held);

        tracing::trace!(keys = keys.len(), "key lease granted");
        Ok(KeyLease {
            state: Arc::clone(&self.state),
            keys,
        })
    }

    /// Whether `key` is currently leased.
    pub fn is_held(&self, key: &StockKey) -> bool {
        self.state
            .held
            .lock()
            .map(|held| held.contains(key))
            .unwrap_or(true)
    }
}

/// Exclusive hold on a set of keys; released on drop.
#[derive(Debug)]
pub struct KeyLease {
    state: Arc<LockState>,
    keys: Vec<StockKey>,
}

impl KeyLease {
    /// Leased keys in lock order.
    pub fn keys(&self) -> &[StockKey] {
        &self.keys
    }

    pub fn covers(&self, key: &StockKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        // Release even through a poisoned mutex; the set itself is still valid.
        let mut held = self
            .state
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.state.released.notify_all();
    }
}
