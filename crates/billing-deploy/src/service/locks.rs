//! Name-keyed async locks.
//!
//! Two workers touching the same resource name run one after the other;
//! different names never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of per-name locks, created on first use.
#[derive(Debug, Default)]
pub struct NameLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`. Released when the guard drops.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.table.lock().entry(key.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    /// Number of names seen so far.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no name was locked yet.
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}
