use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::LedgerResult;
use crate::record::{TransactionRecord, TxnIdGenerator};
use crate::traits::TransactionLedger;

#[derive(Default)]
struct LedgerState {
    open: BTreeMap<String, BTreeMap<i64, TransactionRecord>>,
    reindex_in_process: bool,
}

/// Volatile ledger for tests and single-process embedding.
#[derive(Default)]
pub struct InMemoryLedger {
    ids: TxnIdGenerator,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of open records across all members.
    pub fn open_count(&self) -> usize {
        let state = self.state.lock().expect("lock poisoned");
        state.open.values().map(BTreeMap::len).sum()
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("open", &self.open_count())
            .finish()
    }
}

impl TransactionLedger for InMemoryLedger {
    fn next_txn_id(&self) -> i64 {
        self.ids.next()
    }

    fn record_open(&self, member_id: &str, record: &TransactionRecord) -> LedgerResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        state
            .open
            .entry(member_id.to_string())
            .or_default()
            .insert(record.txn_id, record.clone());
        debug!(member_id, txn_id = record.txn_id, object_id = %record.object_id, "transaction opened");
        Ok(())
    }

    fn close(&self, txn_id: i64, member_id: &str) -> LedgerResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(member) = state.open.get_mut(member_id) {
            member.remove(&txn_id);
            if member.is_empty() {
                state.open.remove(member_id);
            }
        }
        Ok(())
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
        self.state.lock().expect("lock poisoned").open.remove(member_id);
        Ok(())
    }

    fn set_reindex_in_process(&self, in_process: bool) -> LedgerResult<()> {
        self.state.lock().expect("lock poisoned").reindex_in_process = in_process;
        Ok(())
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
    fn open_then_close_leaves_nothing() {
        let ledger = InMemoryLedger::new();
        let rec = ledger.open("m1", "test/1", TxnOperation::Update, true).unwrap();
        assert_eq!(ledger.open_transactions("m1").unwrap(), vec![rec.clone()]);
        assert_eq!(ledger.members_with_open_transactions().unwrap(), vec!["m1".to_string()]);

        ledger.close(rec.txn_id, "m1").unwrap();
        assert!(ledger.open_transactions("m1").unwrap().is_empty());
        assert!(ledger.members_with_open_transactions().unwrap().is_empty());
    }

    #[test]
    fn open_transactions_are_in_id_order() {
        let ledger = InMemoryLedger::new();
        let ids: Vec<i64> = (0..5)
            .map(|i| ledger.open("m1", &format!("test/{i}"), TxnOperation::Update, false).unwrap().txn_id)
            .collect();
        let listed: Vec<i64> = ledger.open_transactions("m1").unwrap().iter().map(|r| r.txn_id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn close_is_idempotent() {
        let ledger = InMemoryLedger::new();
        ledger.close(42, "nobody").unwrap();
        let rec = ledger.open("m1", "x", TxnOperation::Delete, true).unwrap();
        ledger.close(rec.txn_id, "m1").unwrap();
        ledger.close(rec.txn_id, "m1").unwrap();
        assert_eq!(ledger.open_count(), 0);
    }

    #[test]
    fn cleanup_forgets_member() {
        let ledger = InMemoryLedger::new();
        ledger.open("m1", "a", TxnOperation::Update, true).unwrap();
        ledger.open("m2", "b", TxnOperation::Update, true).unwrap();
        ledger.cleanup("m1").unwrap();
        assert_eq!(ledger.members_with_open_transactions().unwrap(), vec!["m2".to_string()]);
    }

    #[test]
    fn reindex_flag_round_trips() {
        let ledger = InMemoryLedger::new();
        assert!(!ledger.is_reindex_in_process().unwrap());
        ledger.set_reindex_in_process(true).unwrap();
        assert!(ledger.is_reindex_in_process().unwrap());
    }
}
