use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LedgerResult;
use crate::record::TransactionRecord;
use crate::wal::FramedLog;

const QUEUE_FILE: &str = "reprocessing.log";

/// A transaction handed off for later reprocessing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTransaction {
    /// Member that originally owned the transaction.
    pub member_id: String,
    pub record: TransactionRecord,
}

/// Durable queue of transactions recovery could not finish inline.
pub trait ReprocessingQueue: Send + Sync {
    fn insert(&self, record: &TransactionRecord, member_id: &str) -> LedgerResult<()>;

    /// Queued entries in transaction-id order.
    fn pending(&self) -> LedgerResult<Vec<QueuedTransaction>>;

    /// Drop the entry for `txn_id`. Removing an unknown id is a no-op.
    fn remove(&self, txn_id: i64) -> LedgerResult<()>;
}

impl<Q: ReprocessingQueue + ?Sized> ReprocessingQueue for Box<Q> {
    fn insert(&self, record: &TransactionRecord, member_id: &str) -> LedgerResult<()> {
        (**self).insert(record, member_id)
    }

    fn pending(&self) -> LedgerResult<Vec<QueuedTransaction>> {
        (**self).pending()
    }

    fn remove(&self, txn_id: i64) -> LedgerResult<()> {
        (**self).remove(txn_id)
    }
}

/// Volatile queue keyed by transaction id.
#[derive(Debug, Default)]
pub struct InMemoryReprocessingQueue {
    entries: Mutex<BTreeMap<i64, QueuedTransaction>>,
}

impl InMemoryReprocessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReprocessingQueue for InMemoryReprocessingQueue {
    fn insert(&self, record: &TransactionRecord, member_id: &str) -> LedgerResult<()> {
        self.entries.lock().expect("lock poisoned").insert(
            record.txn_id,
            QueuedTransaction {
                member_id: member_id.to_string(),
                record: record.clone(),
            },
        );
        Ok(())
    }

    fn pending(&self) -> LedgerResult<Vec<QueuedTransaction>> {
        Ok(self.entries.lock().expect("lock poisoned").values().cloned().collect())
    }

    fn remove(&self, txn_id: i64) -> LedgerResult<()> {
        self.entries.lock().expect("lock poisoned").remove(&txn_id);
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum QueueEntry {
    Insert(QueuedTransaction),
    Remove(i64),
}

/// Queue persisted as a CRC-framed append log.
pub struct FileReprocessingQueue {
    log: FramedLog<QueueEntry>,
    entries: Mutex<BTreeMap<i64, QueuedTransaction>>,
}

impl FileReprocessingQueue {
    pub fn open(dir: &Path) -> LedgerResult<Self> {
        let log = FramedLog::open(&dir.join(QUEUE_FILE))?;
        let mut entries = BTreeMap::new();
        for entry in log.recover()? {
            match entry {
                QueueEntry::Insert(q) => {
                    entries.insert(q.record.txn_id, q);
                }
                QueueEntry::Remove(txn_id) => {
                    entries.remove(&txn_id);
                }
            }
        }
        info!(path = %log.path().display(), pending = entries.len(), "reprocessing queue opened");
        Ok(Self {
            log,
            entries: Mutex::new(entries),
        })
    }

    /// Rewrite the log so it holds only pending entries.
    pub fn compact(&self) -> LedgerResult<()> {
        let entries = self.entries.lock().expect("lock poisoned");
        let snapshot: Vec<QueueEntry> = entries.values().cloned().map(QueueEntry::Insert).collect();
        self.log.rewrite(&snapshot)
    }
}

impl ReprocessingQueue for FileReprocessingQueue {
    fn insert(&self, record: &TransactionRecord, member_id: &str) -> LedgerResult<()> {
        let queued = QueuedTransaction {
            member_id: member_id.to_string(),
            record: record.clone(),
        };
        let mut entries = self.entries.lock().expect("lock poisoned");
        self.log.append(&QueueEntry::Insert(queued.clone()))?;
        entries.insert(record.txn_id, queued);
        Ok(())
    }

    fn pending(&self) -> LedgerResult<Vec<QueuedTransaction>> {
        Ok(self.entries.lock().expect("lock poisoned").values().cloned().collect())
    }

    fn remove(&self, txn_id: i64) -> LedgerResult<()> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        if entries.remove(&txn_id).is_some() {
            self.log.append(&QueueEntry::Remove(txn_id))?;
        }
        Ok(())
    }
}

/// Wraps a durable queue and remembers inserts it rejected.
///
/// A failed insert is still reported to the caller; the entry is kept in
/// memory so a later [`drain_remembered`](Self::drain_remembered) can retry
/// it once the underlying queue or ledger is healthy again.
pub struct FallbackQueue<Q> {
    inner: Q,
    remembered: Mutex<BTreeMap<i64, QueuedTransaction>>,
}

impl<Q: ReprocessingQueue> FallbackQueue<Q> {
    pub fn new(inner: Q) -> Self {
        Self {
            inner,
            remembered: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Keep `queued` for a later retry.
    pub fn remember(&self, queued: QueuedTransaction) {
        self.remembered
            .lock()
            .expect("lock poisoned")
            .insert(queued.record.txn_id, queued);
    }

    pub fn remembered_count(&self) -> usize {
        self.remembered.lock().expect("lock poisoned").len()
    }

    /// Take every remembered entry, in transaction-id order.
    ///
    /// Callers that fail to finish an entry should [`remember`](Self::remember)
    /// it again.
    pub fn drain_remembered(&self) -> Vec<QueuedTransaction> {
        let mut remembered = self.remembered.lock().expect("lock poisoned");
        std::mem::take(&mut *remembered).into_values().collect()
    }
}

impl<Q: ReprocessingQueue> ReprocessingQueue for FallbackQueue<Q> {
    fn insert(&self, record: &TransactionRecord, member_id: &str) -> LedgerResult<()> {
        if let Err(e) = self.inner.insert(record, member_id) {
            warn!(txn_id = record.txn_id, error = %e, "reprocessing queue insert failed, remembering in memory");
            self.remember(QueuedTransaction {
                member_id: member_id.to_string(),
                record: record.clone(),
            });
            return Err(e);
        }
        Ok(())
    }

    fn pending(&self) -> LedgerResult<Vec<QueuedTransaction>> {
        self.inner.pending()
    }

    fn remove(&self, txn_id: i64) -> LedgerResult<()> {
        self.inner.remove(txn_id)
    }
}
