use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerResult;
use crate::record::{TransactionRecord, TxnIdGenerator};
use crate::traits::TransactionLedger;
use crate::wal::FramedLog;

const LEDGER_FILE: &str = "transactions.log";

/// One line of the ledger's append log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum LedgerEntry {
    Open { member_id: String, record: TransactionRecord },
    Close { member_id: String, txn_id: i64 },
    Cleanup { member_id: String },
    Reindex(bool),
}

#[derive(Default)]
struct LedgerState {
    open: BTreeMap<String, BTreeMap<i64, TransactionRecord>>,
    reindex_in_process: bool,
}

impl LedgerState {
    fn apply(&mut self, entry: LedgerEntry) {
        match entry {
            LedgerEntry::Open { member_id, record } => {
                self.open.entry(member_id).or_default().insert(record.txn_id, record);
            }
            LedgerEntry::Close { member_id, txn_id } => {
                if let Some(member) = self.open.get_mut(&member_id) {
                    member.remove(&txn_id);
                    if member.is_empty() {
                        self.open.remove(&member_id);
                    }
                }
            }
            LedgerEntry::Cleanup { member_id } => {
                self.open.remove(&member_id);
            }
            LedgerEntry::Reindex(flag) => self.reindex_in_process = flag,
        }
    }

    fn snapshot(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .open
            .iter()
            .flat_map(|(member, recs)| {
                recs.values().map(move |r| LedgerEntry::Open {
                    member_id: member.clone(),
                    record: r.clone(),
                })
            })
            .collect();
        if self.reindex_in_process {
            entries.push(LedgerEntry::Reindex(true));
        }
        entries
    }

    fn max_txn_id(&self) -> i64 {
        self.open
            .values()
            .filter_map(|m| m.keys().next_back().copied())
            .max()
            .unwrap_or(0)
    }
}

/// Durable ledger backed by a CRC-framed append log in a data directory.
///
/// Every open and close is appended and synced before returning; the
/// in-memory view is rebuilt by replaying the log on open.
pub struct FileLedger {
    ids: TxnIdGenerator,
    log: FramedLog<LedgerEntry>,
    state: Mutex<LedgerState>,
}

impl FileLedger {
    /// Open the ledger stored under `dir`, replaying any existing log.
    pub fn open(dir: &Path) -> LedgerResult<Self> {
        let log = FramedLog::open(&dir.join(LEDGER_FILE))?;
        let mut state = LedgerState::default();
        let entries = log.recover()?;
        let replayed = entries.len();
        for entry in entries {
            state.apply(entry);
        }
        info!(
            path = %log.path().display(),
            replayed,
            members = state.open.len(),
            "transaction ledger opened"
        );
        Ok(Self {
            ids: TxnIdGenerator::starting_after(state.max_txn_id()),
            log,
            state: Mutex::new(state),
        })
    }

    /// Rewrite the log so it contains only currently open records.
    pub fn compact(&self) -> LedgerResult<()> {
        let state = self.state.lock().expect("lock poisoned");
        self.log.rewrite(&state.snapshot())
    }

    fn write(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        self.log.append(&entry)?;
        state.apply(entry);
        Ok(())
    }
}

impl TransactionLedger for FileLedger {
    fn next_txn_id(&self) -> i64 {
        self.ids.next()
    }

    fn record_open(&self, member_id: &str, record: &TransactionRecord) -> LedgerResult<()> {
        debug!(member_id, txn_id = record.txn_id, "recording open transaction");
        self.write(LedgerEntry::Open {
            member_id: member_id.to_string(),
            record: record.clone(),
        })
    }

    fn close(&self, txn_id: i64, member_id: &str) -> LedgerResult<()> {
        self.write(LedgerEntry::Close {
            member_id: member_id.to_string(),
            txn_id,
        })
    }

    fn open_transactions(&self, member_id: &str) -> LedgerResult<Vec<TransactionRecord>> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state
            .open
            .get(member_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn members_with_open_transactions(&self) -> LedgerResult<Vec<String>> {
        let state = self.state.lock().expect("lock poisoned");
        Ok(state.open.keys().cloned().collect())
    }

    fn cleanup(&self, member_id: &str) -> LedgerResult<()> {
        self.write(LedgerEntry::Cleanup {
            member_id: member_id.to_string(),
        })
    }

    fn set_reindex_in_process(&self, in_process: bool) -> LedgerResult<()> {
        self.write(LedgerEntry::Reindex(in_process))
    }

    fn is_reindex_in_process(&self) -> LedgerResult<bool> {
        Ok(self.state.lock().expect("lock poisoned").reindex_in_process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TxnOperation;

    #[test]
    fn open_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (kept, closed) = {
            let ledger = FileLedger::open(dir.path()).unwrap();
            let a = ledger.open("m1", "test/a", TxnOperation::Update, true).unwrap();
            let b = ledger.open("m1", "test/b", TxnOperation::Delete, false).unwrap();
            ledger.close(b.txn_id, "m1").unwrap();
            ledger.set_reindex_in_process(true).unwrap();
            (a, b)
        };

        let ledger = FileLedger::open(dir.path()).unwrap();
        let open = ledger.open_transactions("m1").unwrap();
        assert_eq!(open, vec![kept.clone()]);
        assert!(!open.iter().any(|r| r.txn_id == closed.txn_id));
        assert!(ledger.is_reindex_in_process().unwrap());
        assert!(ledger.next_txn_id() > kept.txn_id);
    }

    #[test]
    fn cleanup_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = FileLedger::open(dir.path()).unwrap();
            ledger.open("gone", "x", TxnOperation::Update, true).unwrap();
            ledger.open("alive", "y", TxnOperation::Update, true).unwrap();
            ledger.cleanup("gone").unwrap();
        }
        let ledger = FileLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.members_with_open_transactions().unwrap(), vec!["alive".to_string()]);
    }

    #[test]
    fn compact_keeps_only_open_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        let mut last = None;
        for i in 0..20 {
            let rec = ledger.open("m1", &format!("o/{i}"), TxnOperation::Update, true).unwrap();
            if i < 19 {
                ledger.close(rec.txn_id, "m1").unwrap();
            } else {
                last = Some(rec);
            }
        }
        ledger.compact().unwrap();
        drop(ledger);

        let reopened = FileLedger::open(dir.path()).unwrap();
        assert_eq!(reopened.open_transactions("m1").unwrap(), vec![last.unwrap()]);
    }
}
