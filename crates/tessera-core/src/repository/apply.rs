use bytes::Bytes;
use tessera_ledger::TxnOperation;
use tessera_schema::PointerMap;
use tessera_sync::Signal;
use tessera_types::{internal, DigitalObject, PayloadSource, DESIGN_OBJECT_ID, SCHEMA_TYPE};
use tracing::{debug, error};

use super::mutate::uses_scripts;
use super::Repository;
use crate::design::SchemaEntry;
use crate::error::{RepoError, RepoResult};
use crate::replication::{ReplicationKind, ReplicationMessage};

/// Internal username and users list, compared to detect auth changes.
fn auth_fields(object: Option<&DigitalObject>) -> (Option<&str>, Option<&str>) {
    match object {
        Some(o) => (
            o.metadata.internal_str(internal::USERNAME),
            o.metadata.internal_str(internal::USERS),
        ),
        None => (None, None),
    }
}

/// Give every payload that arrived without bytes something to store: the
/// bytes already held locally, or nothing.
fn fill_missing_payload_bytes(mut object: DigitalObject, existing: Option<&DigitalObject>) -> DigitalObject {
    for payload in &mut object.payloads {
        if payload.is_pending() {
            continue;
        }
        let held = existing.is_some_and(|e| e.payload(&payload.name).is_some());
        if !held {
            payload.source = PayloadSource::Pending(Bytes::new());
        }
    }
    object
}

impl Repository {
    /// Apply one message read from the replication bus.
    ///
    /// Messages this cluster sent are ignored. Applying the same message
    /// twice leaves the same state.
    pub fn apply_replication_message(&self, text: &str) -> RepoResult<()> {
        let message = ReplicationMessage::from_json(text)?;
        if message.cluster_id == self.config.cluster_id {
            debug!(handle = %message.handle, "ignoring self-originated replication message");
            return Ok(());
        }
        let result = match message.kind {
            ReplicationKind::Delete => self.delete_object(&message.handle, None, false),
            ReplicationKind::Update => match message.object {
                Some(carried) => carried
                    .into_object()
                    .and_then(|object| self.apply_replicated_update(&message.handle, object)),
                None => Err(RepoError::BadRequest(format!(
                    "UPDATE for {} carries no object",
                    message.handle
                ))),
            },
        };
        if let Err(e) = &result {
            error!(handle = %message.handle, error = %e, "replication apply failed");
            self.alerter
                .alert(&format!("Error replicating handle {}: {e}", message.handle));
        }
        result
    }

    fn apply_replicated_update(&self, handle: &str, object: DigitalObject) -> RepoResult<()> {
        if object.id != handle {
            return Err(RepoError::BadRequest(format!(
                "UPDATE for {handle} carries object {}",
                object.id
            )));
        }
        if object.id == DESIGN_OBJECT_ID {
            return self.apply_replicated_design(object);
        }

        let _guard = self.locker.acquire(handle)?;
        let existing = self.storage.get(handle)?;
        let object = fill_missing_payload_bytes(object, existing.as_ref());
        let (pointers, index_payloads) = self.pointers_for(&object);
        let compiled = if object.object_type == SCHEMA_TYPE {
            Some(SchemaEntry::from_object(&object)?)
        } else {
            None
        };

        let stored = self.in_transaction(handle, TxnOperation::Update, false, |_txn| {
            let stored = if existing.is_some() {
                self.storage.update(object)?
            } else {
                self.storage.create(object)?
            };
            self.publish_derived(&stored, index_payloads, &pointers, false)?;
            Ok(stored)
        })?;
        debug!(object_id = %handle, "applied replicated update");

        if let Some(compiled) = compiled {
            self.register_schema(handle, compiled, false);
        }
        if auth_fields(existing.as_ref()) != auth_fields(Some(&stored)) {
            self.signal_auth_change();
        }
        if uses_scripts(&stored, &pointers) {
            self.clear_script_cache();
        }
        Ok(())
    }

    /// Store a replicated design object and rebuild the snapshot from it.
    fn apply_replicated_design(&self, object: DigitalObject) -> RepoResult<()> {
        let _guard = self.locker.acquire(DESIGN_OBJECT_ID)?;
        let _write = self.design_locker.write()?;
        let exists = self.storage.exists(DESIGN_OBJECT_ID)?;
        self.in_transaction(DESIGN_OBJECT_ID, TxnOperation::Update, false, |_txn| {
            let stored = if exists {
                self.storage.update(object)?
            } else {
                self.storage.create(object)?
            };
            self.publish_derived(&stored, false, &PointerMap::new(), false)
        })?;
        let next = self.load_design_snapshot()?;
        debug!(version = next.version, "applied replicated design");
        self.design.swap(next);
        self.send_signal(Signal::Design);
        Ok(())
    }
}
