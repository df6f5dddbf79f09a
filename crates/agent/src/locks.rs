//! Per-project-root mutual exclusion
//!
//! Sessions on the same root share one async mutex, held for the duration of
//! a single tool execution. Sessions on different roots never contend. The
//! table only holds weak references, so a root's entry goes away with the
//! last session on it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Mutex as AsyncMutex;

pub type RootLock = Arc<AsyncMutex<()>>;

#[derive(Debug, Clone, Default)]
pub struct RootLocks {
    table: Arc<Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>>,
}

impl RootLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock shared by every session on `root` (expects a canonical path)
    pub fn lock_for(&self, root: &Path) -> RootLock {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = table.get(root).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        table.insert(root.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Roots with at least one live session
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
