use std::sync::mpsc;
use std::sync::Arc;

use tessera_index::{fields, PayloadIndexState, Query};
use tessera_ledger::{QueuedTransaction, ReprocessingQueue, TransactionRecord};
use tessera_sync::CancelFlag;
use tessera_types::Timestamp;
use tracing::{debug, error, info, warn};

use super::Repository;
use crate::error::RepoResult;

/// What one recovery pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Objects whose stuck payload indexing was redriven.
    pub payload_redrives: usize,
    /// Transactions of departed members replayed inline.
    pub replayed: usize,
    /// Transactions handed to the reprocessing queue instead.
    pub queued: usize,
    /// Departed members whose ledger entries were cleaned up.
    pub members_cleaned: Vec<String>,
}

impl Repository {
    // ---- Departed members ----

    /// Re-derive index and replication state for work left open by members
    /// that are no longer in the cluster.
    ///
    /// Safe to run alongside live traffic: only derived state is rebuilt,
    /// always from what storage holds now. Errors are alerted, never
    /// returned.
    pub fn process_pending_transactions(&self) -> RecoveryReport {
        info!(member = %self.member_id(), "processing pending transactions");
        let mut report = RecoveryReport::default();
        if let Err(e) = self.recover_into(&mut report) {
            error!(error = %e, "error processing pending transactions");
            self.alerter
                .alert(&format!("Error processing pending transactions: {e}"));
        }
        info!(
            payload_redrives = report.payload_redrives,
            replayed = report.replayed,
            queued = report.queued,
            members = report.members_cleaned.len(),
            "finished processing pending transactions"
        );
        report
    }

    fn recover_into(&self, report: &mut RecoveryReport) -> RepoResult<()> {
        let live = self.cluster.members();
        report.payload_redrives = self.redrive_payload_indexing(&live)?;

        let departed: Vec<String> = self
            .ledger
            .members_with_open_transactions()?
            .into_iter()
            .filter(|m| !live.contains(m))
            .collect();
        for member in departed {
            info!(member = %member, "processing pending transactions of departed member");
            match self.recover_member(&member) {
                Ok((replayed, queued)) => {
                    report.replayed += replayed;
                    report.queued += queued;
                    report.members_cleaned.push(member);
                }
                Err(e) => {
                    error!(member = %member, error = %e, "recovery of departed member failed");
                    self.alerter
                        .alert(&format!("Error processing pending transactions for {member}: {e}"));
                }
            }
        }
        Ok(())
    }

    /// Payload indexing marked in process by a member that is gone.
    fn redrive_payload_indexing(&self, live: &[String]) -> RepoResult<usize> {
        let query = live.iter().fold(
            Query::term(fields::PAYLOAD_INDEX_STATE, PayloadIndexState::InProcess.as_str()),
            |query, member| query.and(Query::term(fields::PAYLOAD_INDEX_MEMBER, member.as_str()).not()),
        );
        self.index.ensure_up_to_date()?;
        let stuck = self.index.search_handles(&query)?;
        for handle in &stuck {
            debug!(object_id = %handle, "redriving payload indexing");
            let _guard = self.locker.acquire(handle)?;
            match self.storage.get(handle)? {
                Some(object) => {
                    let (pointers, index_payloads) = self.pointers_for(&object);
                    self.index
                        .index_object(self.member_id(), &object, index_payloads, &pointers)?;
                }
                None => self.index.delete_object(handle)?,
            }
        }
        Ok(stuck.len())
    }

    /// Replay a departed member's transactions in order. After the first
    /// failure the rest go to the reprocessing queue untried.
    fn recover_member(&self, member: &str) -> RepoResult<(usize, usize)> {
        let mut replayed = 0;
        let mut queued = 0;
        let mut failed = false;
        for txn in self.ledger.open_transactions(member)? {
            if !failed {
                match self.replay_transaction(&txn) {
                    Ok(()) => {
                        self.ledger.close(txn.txn_id, member)?;
                        replayed += 1;
                        continue;
                    }
                    Err(e) => {
                        error!(member, txn_id = txn.txn_id, object_id = %txn.object_id, error = %e,
                            "replaying departed member transaction failed");
                        failed = true;
                    }
                }
            }
            self.queue.insert(&txn, member)?;
            self.ledger.close(txn.txn_id, member)?;
            queued += 1;
        }
        self.ledger.cleanup(member)?;
        Ok((replayed, queued))
    }

    /// Rebuild the index entry and replication message for one transaction
    /// from current storage.
    pub fn replay_transaction(&self, txn: &TransactionRecord) -> RepoResult<()> {
        let _guard = self.locker.acquire(&txn.object_id)?;
        match self.storage.get(&txn.object_id)? {
            Some(object) => {
                debug!(txn_id = txn.txn_id, object_id = %txn.object_id, "reindexing pending transaction");
                let (pointers, index_payloads) = self.pointers_for(&object);
                self.publish_derived(&object, index_payloads, &pointers, txn.needs_replicate)
            }
            None => {
                debug!(txn_id = txn.txn_id, object_id = %txn.object_id, "removing pending transaction's object from index");
                self.index.delete_object(&txn.object_id)?;
                if txn.needs_replicate {
                    self.replicate_delete(&txn.object_id)?;
                }
                Ok(())
            }
        }
    }

    // ---- Reprocessing queue ----

    /// Replay queued transactions old enough to drain, then retry entries
    /// the durable queue rejected. Stops at the first failure; what is left
    /// waits for the next drain.
    pub fn drain_reprocessing_queue(&self) -> RepoResult<usize> {
        let delay_ms = i64::try_from(self.config.reprocessing_delay.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Timestamp::now().as_millis().saturating_sub(delay_ms);
        let mut drained = 0;

        for QueuedTransaction { member_id, record } in self.queue.pending()? {
            if record.timestamp > cutoff {
                break;
            }
            self.replay_transaction(&record)?;
            self.queue.remove(record.txn_id)?;
            debug!(member = %member_id, txn_id = record.txn_id, "drained queued transaction");
            drained += 1;
        }

        let mut remembered = self.queue.drain_remembered().into_iter();
        while let Some(entry) = remembered.next() {
            let result = self
                .replay_transaction(&entry.record)
                .and_then(|()| self.ledger.close(entry.record.txn_id, &entry.member_id).map_err(Into::into));
            if let Err(e) = result {
                warn!(txn_id = entry.record.txn_id, error = %e, "remembered transaction still failing");
                self.queue.remember(entry);
                remembered.for_each(|rest| self.queue.remember(rest));
                return Err(e);
            }
            drained += 1;
        }
        Ok(drained)
    }

    // ---- Reindex ----

    /// Rebuild the index entry of every stored object on the worker pool.
    ///
    /// The ledger's reindex flag is held for the duration so a member that
    /// starts mid-run knows to reindex again. Checks `cancel` between
    /// objects. Returns how many objects were reindexed.
    pub fn reindex_all(self: &Arc<Self>, cancel: &CancelFlag) -> RepoResult<usize> {
        self.ledger.set_reindex_in_process(true)?;
        let result = self.reindex_ids(cancel);
        if let Err(e) = self.ledger.set_reindex_in_process(false) {
            warn!(error = %e, "failed to clear reindex flag");
        }
        let count = result?;
        info!(count, cancelled = cancel.is_cancelled(), "reindex finished");
        Ok(count)
    }

    fn reindex_ids(self: &Arc<Self>, cancel: &CancelFlag) -> RepoResult<usize> {
        let ids = self.storage.list_ids()?;
        let (done_tx, done_rx) = mpsc::channel();
        let mut submitted = 0;
        for id in ids {
            if cancel.is_cancelled() {
                break;
            }
            let repo = Arc::clone(self);
            let done = done_tx.clone();
            self.pool.execute(move || {
                let result = repo.reindex_one(&id);
                if let Err(e) = &result {
                    warn!(object_id = %id, error = %e, "reindex failed");
                    repo.alerter.alert(&format!("Failure to reindex {id}: {e}"));
                }
                drop(repo);
                let _ = done.send(matches!(result, Ok(true)));
            });
            submitted += 1;
        }
        drop(done_tx);
        Ok(done_rx.iter().take(submitted).filter(|indexed| *indexed).count())
    }

    fn reindex_one(&self, id: &str) -> RepoResult<bool> {
        let _guard = self.locker.acquire(id)?;
        let Some(object) = self.storage.get(id)? else {
            return Ok(false);
        };
        let (pointers, index_payloads) = self.pointers_for(&object);
        self.publish_derived(&object, index_payloads, &pointers, false)?;
        Ok(true)
    }
}
