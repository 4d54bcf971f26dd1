use crate::error::LedgerResult;
use crate::record::{TransactionRecord, TxnOperation};

/// Durable record of open transactions, keyed by owning cluster member.
pub trait TransactionLedger: Send + Sync {
    /// Allocate a fresh, cluster-wide increasing transaction id.
    fn next_txn_id(&self) -> i64;

    /// Durably record `record` as open and owned by `member_id`.
    fn record_open(&self, member_id: &str, record: &TransactionRecord) -> LedgerResult<()>;

    /// Remove the open record. Closing an already-closed id is a no-op.
    fn close(&self, txn_id: i64, member_id: &str) -> LedgerResult<()>;

    /// Open records owned by `member_id`, in id order.
    fn open_transactions(&self, member_id: &str) -> LedgerResult<Vec<TransactionRecord>>;

    /// Members that currently own at least one open record.
    fn members_with_open_transactions(&self) -> LedgerResult<Vec<String>>;

    /// Forget everything recorded for `member_id`.
    fn cleanup(&self, member_id: &str) -> LedgerResult<()>;

    fn set_reindex_in_process(&self, in_process: bool) -> LedgerResult<()>;

    fn is_reindex_in_process(&self) -> LedgerResult<bool>;

    /// Allocate an id and record a new open transaction.
    fn open(
        &self,
        member_id: &str,
        object_id: &str,
        operation: TxnOperation,
        needs_replicate: bool,
    ) -> LedgerResult<TransactionRecord> {
        let record = TransactionRecord::new(self.next_txn_id(), object_id, operation, needs_replicate);
        self.record_open(member_id, &record)?;
        Ok(record)
    }
}
