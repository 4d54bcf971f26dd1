use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use tessera_types::Timestamp;

/// Kind of mutation a transaction brackets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnOperation {
    Update,
    Delete,
}

/// A durable marker for one in-flight mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txn_id: i64,
    /// Epoch milliseconds at open.
    pub timestamp: i64,
    pub object_id: String,
    pub operation: TxnOperation,
    pub needs_replicate: bool,
}

impl TransactionRecord {
    pub fn new(txn_id: i64, object_id: impl Into<String>, operation: TxnOperation, needs_replicate: bool) -> Self {
        Self {
            txn_id,
            timestamp: Timestamp::now().as_millis(),
            object_id: object_id.into(),
            operation,
            needs_replicate,
        }
    }
}

/// Allocates transaction ids of the form `millis * 1000 + n`.
///
/// Ids are strictly increasing within a process even if the wall clock
/// stalls or steps backwards; across processes they are ordered by clock.
#[derive(Debug, Default)]
pub struct TxnIdGenerator {
    last: AtomicI64,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after `floor`, e.g. the highest id found on disk.
    pub fn starting_after(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    pub fn next(&self) -> i64 {
        let base = Timestamp::now().as_millis().saturating_mul(1000);
        let mut current = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = base.max(current + 1);
            match self
                .last
                .compare_exchange(current, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}
