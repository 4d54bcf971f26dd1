//! Fixtures shared by the repository tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tessera_index::{IndexError, IndexResult, Indexer, InMemoryIndex, Query};
use tessera_ledger::{
    InMemoryReprocessingQueue, LedgerError, LedgerResult, QueuedTransaction, ReprocessingQueue, TransactionRecord,
};
use tessera_schema::PointerMap;
use tessera_store::{InMemoryStorage, Storage};
use tessera_types::{DigitalObject, SCHEMA_TYPE};

use super::{Repository, WriteOptions};
use crate::config::RepositoryConfig;
use crate::error::{RepoError, RepoResult};
use crate::external::{Alerter, SessionInvalidator};
use crate::hooks::{HookContext, LifecycleHooks, ObjectDelta};

pub(crate) fn repo() -> Arc<Repository> {
    Repository::in_memory().unwrap()
}

pub(crate) fn repo_with_index() -> (Arc<Repository>, Arc<InMemoryIndex>) {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let index = Arc::new(InMemoryIndex::with_payload_source(Arc::clone(&storage)));
    let repo = Repository::builder(RepositoryConfig::default())
        .storage(storage)
        .index(index.clone())
        .build()
        .unwrap();
    (repo, index)
}

pub(crate) fn repo_with_hooks(hooks: Arc<dyn LifecycleHooks>) -> Arc<Repository> {
    Repository::builder(RepositoryConfig::default())
        .hooks(hooks)
        .build()
        .unwrap()
}

/// A read-only repository over storage that already holds `schemas`.
pub(crate) fn read_only_repo_with(schemas: &[(&str, Value)]) -> Arc<Repository> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let writer = Repository::builder(RepositoryConfig::default())
        .storage(Arc::clone(&storage))
        .build()
        .unwrap();
    for (name, schema) in schemas {
        define_schema(&writer, name, schema.clone());
    }
    drop(writer);
    let config = RepositoryConfig {
        read_only: true,
        ..RepositoryConfig::default()
    };
    Repository::builder(config).storage(storage).build().unwrap()
}

pub(crate) fn define_schema(repo: &Repository, name: &str, schema: Value) -> DigitalObject {
    repo.create(
        ObjectDelta::create(SCHEMA_TYPE, json!({"name": name, "schema": schema})),
        &WriteOptions::anonymous(),
    )
    .unwrap()
}

pub(crate) fn define_hashed_schema(repo: &Repository, name: &str) -> DigitalObject {
    repo.create(
        ObjectDelta::create(
            SCHEMA_TYPE,
            json!({"name": name, "schema": {"type": "object"}, "hashObject": true}),
        ),
        &WriteOptions::anonymous(),
    )
    .unwrap()
}

pub(crate) fn user_schema() -> Value {
    json!({
        "type": "object",
        "required": ["username"],
        "properties": {
            "username": {"type": "string", "cordra": {"auth": "username"}},
            "password": {"type": "string", "cordra": {"auth": "password"}},
            "active": {"type": "boolean", "cordra": {"auth": "accountActive"}},
            "mustChange": {"type": "boolean", "cordra": {"auth": "requirePasswordChange"}},
            "apiKey": {"type": "string", "cordra": {"secureProperty": true}}
        }
    })
}

pub(crate) fn group_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "users": {
                "type": "array",
                "items": {"type": "string"},
                "cordra": {"auth": "usersList"}
            }
        }
    })
}

pub(crate) fn define_user_and_group_schemas(repo: &Repository) {
    define_schema(repo, "User", user_schema());
    define_schema(repo, "Group", group_schema());
}

pub(crate) fn create_user(repo: &Repository, username: &str, password: &str) -> DigitalObject {
    repo.create(
        ObjectDelta::create("User", json!({"username": username, "password": password})),
        &WriteOptions::anonymous(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Failure injection
// ---------------------------------------------------------------------------

/// An index whose writes fail on demand, for everything or for chosen ids.
pub(crate) struct FailingIndex {
    inner: InMemoryIndex,
    failing: AtomicBool,
    failing_ids: Mutex<BTreeSet<String>>,
}

impl FailingIndex {
    pub(crate) fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: InMemoryIndex::with_payload_source(storage),
            failing: AtomicBool::new(false),
            failing_ids: Mutex::new(BTreeSet::new()),
        }
    }

    pub(crate) fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_for(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn heal(&self) {
        self.fail(false);
        self.failing_ids.lock().unwrap().clear();
    }

    pub(crate) fn inner(&self) -> &InMemoryIndex {
        &self.inner
    }

    fn check(&self, id: &str) -> IndexResult<()> {
        if self.failing.load(Ordering::SeqCst) || self.failing_ids.lock().unwrap().contains(id) {
            return Err(IndexError::WriteFailed {
                id: id.to_string(),
                reason: "injected".into(),
            });
        }
        Ok(())
    }
}

impl Indexer for FailingIndex {
    fn index_object(
        &self,
        member_id: &str,
        object: &DigitalObject,
        index_payloads: bool,
        pointers: &PointerMap,
    ) -> IndexResult<()> {
        self.check(&object.id)?;
        self.inner.index_object(member_id, object, index_payloads, pointers)
    }

    fn delete_object(&self, id: &str) -> IndexResult<()> {
        self.check(id)?;
        self.inner.delete_object(id)
    }

    fn search(&self, query: &Query) -> IndexResult<Vec<DigitalObject>> {
        self.inner.search(query)
    }

    fn search_handles(&self, query: &Query) -> IndexResult<Vec<String>> {
        self.inner.search_handles(query)
    }

    fn ensure_up_to_date(&self) -> IndexResult<()> {
        self.inner.ensure_up_to_date()
    }
}

pub(crate) fn repo_with_failing_index() -> (Arc<Repository>, Arc<FailingIndex>) {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let index = Arc::new(FailingIndex::new(Arc::clone(&storage)));
    let repo = Repository::builder(RepositoryConfig::default())
        .storage(storage)
        .index(index.clone())
        .build()
        .unwrap();
    (repo, index)
}

/// A reprocessing queue whose inserts fail while the shared flag is set.
pub(crate) struct FailingQueue {
    inner: InMemoryReprocessingQueue,
    failing: Arc<AtomicBool>,
}

impl FailingQueue {
    pub(crate) fn new(failing: Arc<AtomicBool>) -> Self {
        Self {
            inner: InMemoryReprocessingQueue::new(),
            failing,
        }
    }
}

impl ReprocessingQueue for FailingQueue {
    fn insert(&self, record: &TransactionRecord, member_id: &str) -> LedgerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("injected".into()));
        }
        self.inner.insert(record, member_id)
    }

    fn pending(&self) -> LedgerResult<Vec<QueuedTransaction>> {
        self.inner.pending()
    }

    fn remove(&self, txn_id: i64) -> LedgerResult<()> {
        self.inner.remove(txn_id)
    }
}

// ---------------------------------------------------------------------------
// Recording collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct RecordingAlerter {
    pub(crate) alerts: Mutex<Vec<String>>,
}

impl RecordingAlerter {
    pub(crate) fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Alerter for RecordingAlerter {
    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSessions {
    pub(crate) invalidated: Mutex<Vec<String>>,
}

impl SessionInvalidator for RecordingSessions {
    fn invalidate_sessions_for(&self, user_id: &str) -> RepoResult<()> {
        self.invalidated.lock().unwrap().push(user_id.to_string());
        Ok(())
    }
}

/// Refuses every delete.
#[derive(Debug)]
pub(crate) struct VetoDeletes;

impl LifecycleHooks for VetoDeletes {
    fn before_delete(&self, object: &DigitalObject, _ctx: &HookContext<'_>) -> RepoResult<()> {
        Err(RepoError::Forbidden(format!("{} is protected", object.id)))
    }
}
