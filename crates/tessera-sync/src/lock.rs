use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use tracing::trace;

use crate::error::SyncResult;

/// Mutual exclusion by string key.
///
/// `lock` blocks until the key is free and is not reentrant: locking a key
/// the current thread already holds deadlocks. Implementations may be
/// in-process or backed by a cluster lock service.
pub trait NameLocker: Send + Sync {
    fn lock(&self, key: &str) -> SyncResult<()>;

    fn release(&self, key: &str) -> SyncResult<()>;
}

impl dyn NameLocker + '_ {
    /// Lock `key` and return a guard that releases it on drop.
    pub fn acquire(&self, key: &str) -> SyncResult<NameGuard<'_>> {
        self.lock(key)?;
        Ok(NameGuard {
            locker: self,
            key: key.to_string(),
        })
    }
}

/// Releases its key when dropped.
pub struct NameGuard<'a> {
    locker: &'a dyn NameLocker,
    key: String,
}

impl NameGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.locker.release(&self.key) {
            tracing::error!(key = %self.key, error = %e, "failed to release name lock");
        }
    }
}

impl std::fmt::Debug for NameGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameGuard").field("key", &self.key).finish()
    }
}

/// Single-process name locker: a set of held keys plus a condition variable.
#[derive(Default)]
pub struct MemoryNameLocker {
    held: Mutex<HashSet<String>>,
    freed: Condvar,
}

impl MemoryNameLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.held.lock().expect("lock poisoned").contains(key)
    }
}

impl NameLocker for MemoryNameLocker {
    fn lock(&self, key: &str) -> SyncResult<()> {
        let mut held = self.held.lock().expect("lock poisoned");
        while held.contains(key) {
            held = self.freed.wait(held).expect("lock poisoned");
        }
        held.insert(key.to_string());
        trace!(key, "name lock acquired");
        Ok(())
    }

    fn release(&self, key: &str) -> SyncResult<()> {
        let mut held = self.held.lock().expect("lock poisoned");
        if held.remove(key) {
            // Waiters for different keys share the condvar.
            self.freed.notify_all();
        }
        Ok(())
    }
}
