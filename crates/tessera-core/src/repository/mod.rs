//! The object-mutation orchestrator.
//!
//! [`Repository`] ties the collaborators together: every create, update,
//! delete and publish runs under the object's name lock, through the field
//! pipeline, and inside a ledger transaction that brackets the storage,
//! index and replication writes. Work left open by a crashed member is
//! replayed from current storage by [`Repository::process_pending_transactions`].

mod apply;
mod background;
mod lookups;
mod mutate;
mod passwords;
mod payloads;
mod recovery;
mod versions;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tessera_index::{fields, InMemoryIndex, Indexer, Query};
use tessera_ledger::{
    FallbackQueue, FileLedger, FileReprocessingQueue, InMemoryLedger, InMemoryReprocessingQueue,
    ReprocessingQueue, TransactionLedger, TransactionRecord, TxnOperation,
};
use tessera_schema::PointerMap;
use tessera_store::{InMemoryStorage, Storage};
use tessera_sync::{
    CancelFlag, ClusterCoordinator, DesignLocker, LocalCluster, MemoryDesignLocker, MemoryNameLocker, NameLocker, Signal,
    Throttle, WorkerPool,
};
use tessera_gate::FieldPipeline;
use tessera_types::{internal, DigitalObject, Timestamp, DESIGN_OBJECT_ID, SCHEMA_TYPE};
use tracing::{debug, error, info, warn};

use crate::auth_cache::{recursive_groups, AuthCache};
use crate::config::{Design, RepositoryConfig};
use crate::design::{DesignCache, DesignSnapshot, SchemaEntry, DESIGN_TYPE};
use crate::error::{RepoError, RepoResult};
use crate::external::{Alerter, NameResolver, SessionInvalidator, TracingAlerter};
use crate::hashing::{self, VerificationReport};
use crate::hooks::{HookContext, LifecycleHooks, NoOpHooks};
use crate::minter::HandleMinter;
use crate::replication::{ReplicationMessage, ReplicationProducer};

pub use background::BackgroundTasks;
pub use passwords::ADMIN_USERNAME;
pub use recovery::RecoveryReport;

/// Lock key serializing Schema-name claims. Handles always contain `/`, so
/// it cannot collide with an object id.
const SCHEMA_NAME_LOCK: &str = "schema-names";
/// Lock key serializing username claims.
const USERNAME_LOCK: &str = "usernames";

/// Who is writing, and whether the write is real.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions<'a> {
    pub user_id: Option<&'a str>,
    /// Run the whole pipeline and return the result without persisting it.
    pub dry_run: bool,
}

impl<'a> WriteOptions<'a> {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn as_user(user_id: &'a str) -> Self {
        Self {
            user_id: Some(user_id),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Repository`]. Every collaborator has an in-process
/// default.
pub struct RepositoryBuilder {
    config: RepositoryConfig,
    storage: Option<Arc<dyn Storage>>,
    index: Option<Arc<dyn Indexer>>,
    ledger: Option<Arc<dyn TransactionLedger>>,
    queue: Option<Box<dyn ReprocessingQueue>>,
    locker: Option<Arc<dyn NameLocker>>,
    design_locker: Option<Arc<dyn DesignLocker>>,
    cluster: Option<Arc<dyn ClusterCoordinator>>,
    replication: Option<Arc<dyn ReplicationProducer>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    name_resolver: Option<Arc<dyn NameResolver>>,
    sessions: Option<Arc<dyn SessionInvalidator>>,
    alerter: Option<Arc<dyn Alerter>>,
    recover_on_start: bool,
}

impl RepositoryBuilder {
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            config,
            storage: None,
            index: None,
            ledger: None,
            queue: None,
            locker: None,
            design_locker: None,
            cluster: None,
            replication: None,
            hooks: None,
            name_resolver: None,
            sessions: None,
            alerter: None,
            recover_on_start: true,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn index(mut self, index: Arc<dyn Indexer>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn TransactionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn reprocessing_queue(mut self, queue: Box<dyn ReprocessingQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn name_locker(mut self, locker: Arc<dyn NameLocker>) -> Self {
        self.locker = Some(locker);
        self
    }

    pub fn design_locker(mut self, locker: Arc<dyn DesignLocker>) -> Self {
        self.design_locker = Some(locker);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterCoordinator>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn replication(mut self, producer: Arc<dyn ReplicationProducer>) -> Self {
        self.replication = Some(producer);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn name_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.name_resolver = Some(resolver);
        self
    }

    pub fn session_invalidator(mut self, sessions: Arc<dyn SessionInvalidator>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    /// Skip the recovery pass `build` normally runs.
    pub fn without_startup_recovery(mut self) -> Self {
        self.recover_on_start = false;
        self
    }

    pub fn build(self) -> RepoResult<Arc<Repository>> {
        let config = self.config;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let index = self
            .index
            .unwrap_or_else(|| Arc::new(InMemoryIndex::with_payload_source(Arc::clone(&storage))));
        let ledger: Arc<dyn TransactionLedger> = match (self.ledger, &config.data_dir) {
            (Some(ledger), _) => ledger,
            (None, Some(dir)) => Arc::new(FileLedger::open(dir)?),
            (None, None) => Arc::new(InMemoryLedger::new()),
        };
        let queue: Box<dyn ReprocessingQueue> = match (self.queue, &config.data_dir) {
            (Some(queue), _) => queue,
            (None, Some(dir)) => Box::new(FileReprocessingQueue::open(dir)?),
            (None, None) => Box::new(InMemoryReprocessingQueue::new()),
        };
        let cluster = self.cluster.unwrap_or_else(|| match &config.member_id {
            Some(id) => Arc::new(LocalCluster::new(id.clone())),
            None => Arc::new(LocalCluster::standalone()),
        });
        let pool = WorkerPool::new("tessera-worker", config.worker_threads, config.worker_queue_capacity);
        let throttle_delay = config.auth_precache_throttle;
        let initial_design = DesignSnapshot::bootstrap()?;

        let repo = Arc::new_cyclic(|weak: &Weak<Repository>| {
            let weak = weak.clone();
            let precache = Throttle::new("auth-precache", throttle_delay, throttle_delay / 10, move || {
                if let Some(repo) = weak.upgrade() {
                    repo.precache_auth();
                }
            });
            Repository {
                config,
                storage,
                index,
                ledger,
                queue: FallbackQueue::new(queue),
                locker: self.locker.unwrap_or_else(|| Arc::new(MemoryNameLocker::new())),
                design_locker: self
                    .design_locker
                    .unwrap_or_else(|| Arc::new(MemoryDesignLocker::new())),
                cluster,
                replication: self.replication,
                hooks: self.hooks.unwrap_or_else(|| Arc::new(NoOpHooks)),
                name_resolver: self.name_resolver,
                sessions: self.sessions,
                alerter: self.alerter.unwrap_or_else(|| Arc::new(TracingAlerter)),
                pipeline: FieldPipeline::with_default_stages(),
                design: DesignCache::new(initial_design),
                minter: HandleMinter::new(),
                auth_cache: AuthCache::new(),
                auth_changes: AtomicU64::new(0),
                index_covered: AtomicU64::new(0),
                precache,
                pool,
            }
        });

        repo.initialize_design_if_needed()?;
        repo.reload_design()?;
        if !repo.config.read_only {
            repo.update_known_schemas_by_search()?;
        }
        info!(member = %repo.member_id(), read_only = repo.config.read_only, "repository ready");
        if self.recover_on_start {
            repo.process_pending_transactions();
        }
        if repo.ledger.is_reindex_in_process()? {
            warn!("previous reindex did not finish, reindexing everything");
            repo.reindex_all(&CancelFlag::new())?;
        }
        Ok(repo)
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

pub struct Repository {
    config: RepositoryConfig,
    storage: Arc<dyn Storage>,
    index: Arc<dyn Indexer>,
    ledger: Arc<dyn TransactionLedger>,
    queue: FallbackQueue<Box<dyn ReprocessingQueue>>,
    locker: Arc<dyn NameLocker>,
    design_locker: Arc<dyn DesignLocker>,
    cluster: Arc<dyn ClusterCoordinator>,
    replication: Option<Arc<dyn ReplicationProducer>>,
    hooks: Arc<dyn LifecycleHooks>,
    name_resolver: Option<Arc<dyn NameResolver>>,
    sessions: Option<Arc<dyn SessionInvalidator>>,
    alerter: Arc<dyn Alerter>,
    pipeline: FieldPipeline,
    design: DesignCache,
    minter: HandleMinter,
    auth_cache: AuthCache,
    /// Bumped on every local or signalled auth change.
    auth_changes: AtomicU64,
    /// Value of `auth_changes` the last index barrier covered.
    index_covered: AtomicU64,
    precache: Throttle,
    pool: WorkerPool,
}

impl Repository {
    pub fn builder(config: RepositoryConfig) -> RepositoryBuilder {
        RepositoryBuilder::new(config)
    }

    /// A standalone in-memory repository.
    pub fn in_memory() -> RepoResult<Arc<Self>> {
        RepositoryBuilder::new(RepositoryConfig::default()).build()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn member_id(&self) -> &str {
        self.cluster.member_id()
    }

    pub fn design(&self) -> Arc<DesignSnapshot> {
        self.design.load()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn index(&self) -> &Arc<dyn Indexer> {
        &self.index
    }

    pub fn ledger(&self) -> &Arc<dyn TransactionLedger> {
        &self.ledger
    }

    pub fn reprocessing_queue(&self) -> &FallbackQueue<Box<dyn ReprocessingQueue>> {
        &self.queue
    }

    fn check_writable(&self) -> RepoResult<()> {
        if self.config.read_only {
            return Err(RepoError::ReadOnly);
        }
        Ok(())
    }

    // ---- Design ----

    /// Create the design object on first start.
    pub fn initialize_design_if_needed(&self) -> RepoResult<()> {
        let _guard = self.locker.acquire(DESIGN_OBJECT_ID)?;
        if self.storage.exists(DESIGN_OBJECT_ID)? {
            return Ok(());
        }
        let mut object = DigitalObject::new(
            DESIGN_OBJECT_ID,
            DESIGN_TYPE,
            serde_json::to_value(Design::default())?,
        );
        let now = Timestamp::now();
        object.metadata.created_on = Some(now);
        object.metadata.modified_on = Some(now);
        match self.storage.create(object) {
            Ok(stored) => {
                self.index.index_object(self.member_id(), &stored, false, &PointerMap::new())?;
                info!("created design object");
                Ok(())
            }
            // Another member got there first.
            Err(tessera_store::StoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the snapshot from the stored design object.
    pub fn reload_design(&self) -> RepoResult<()> {
        let _read = self.design_locker.read()?;
        let next = self.load_design_snapshot()?;
        debug!(version = next.version, schemas = next.type_names().count(), "design reloaded");
        self.design.swap(next);
        Ok(())
    }

    /// Caller holds the design lock, read or write.
    fn load_design_snapshot(&self) -> RepoResult<DesignSnapshot> {
        let object = self
            .storage
            .get(DESIGN_OBJECT_ID)?
            .ok_or_else(|| RepoError::NotFound(DESIGN_OBJECT_ID.to_string()))?;
        let design: Design = serde_json::from_value(object.content)?;
        let ids: Vec<String> = design.schema_ids.keys().cloned().collect();
        let schema_objects = self.storage.get_many(&ids)?;
        DesignSnapshot::build(self.design.load().version + 1, design, &schema_objects)
    }

    /// Persist `next` as the design object and install it. Caller holds the
    /// design write lock.
    fn persist_design_locked(&self, next: DesignSnapshot, needs_replicate: bool) -> RepoResult<()> {
        let mut object = self
            .storage
            .get(DESIGN_OBJECT_ID)?
            .ok_or_else(|| RepoError::NotFound(DESIGN_OBJECT_ID.to_string()))?;
        object.content = serde_json::to_value(&next.design)?;
        self.write_design_object(object, needs_replicate)?;
        self.design.swap(next);
        self.send_signal(Signal::Design);
        Ok(())
    }

    fn write_design_object(&self, mut object: DigitalObject, needs_replicate: bool) -> RepoResult<DigitalObject> {
        object.metadata.modified_on = Some(Timestamp::now());
        self.in_transaction(DESIGN_OBJECT_ID, TxnOperation::Update, needs_replicate, |txn| {
            object.metadata.txn_id = Some(txn.txn_id);
            let stored = self.storage.update(object)?;
            self.publish_derived(&stored, false, &PointerMap::new(), needs_replicate)?;
            Ok(stored)
        })
    }

    /// Replace the design configuration. The schema registry is kept.
    pub fn update_design(&self, mut design: Design) -> RepoResult<()> {
        self.check_writable()?;
        let _guard = self.locker.acquire(DESIGN_OBJECT_ID)?;
        let _write = self.design_locker.write()?;
        let current = self.design.load();
        design.schema_ids = current.design.schema_ids.clone();
        self.persist_design_locked(current.with_design(design), true)
    }

    /// Reconcile the design's schema list with the Schema tips the index
    /// holds. Listed schemas whose objects still exist are kept even when
    /// the index misses them; listed ids whose objects are gone are dropped.
    fn update_known_schemas_by_search(&self) -> RepoResult<()> {
        self.index.ensure_up_to_date()?;
        let _guard = self.locker.acquire(DESIGN_OBJECT_ID)?;
        let _write = self.design_locker.write()?;
        let current = self.design.load();
        let cached: BTreeSet<String> = current.design.schema_ids.keys().cloned().collect();
        let query = Query::term(fields::TYPE, SCHEMA_TYPE).and(Query::term(fields::IS_VERSION, "true").not());
        let mut found: BTreeSet<String> = self.index.search_handles(&query)?.into_iter().collect();
        if found == cached {
            return Ok(());
        }
        for id in &cached {
            if let Some(object) = self.storage.get(id)? {
                if object.object_type == SCHEMA_TYPE && !object.metadata.is_version {
                    found.insert(id.clone());
                }
            }
        }
        if found == cached {
            return Ok(());
        }

        info!(cached = cached.len(), found = found.len(), "schemas found by search differ from the design, rebuilding");
        let mut design = current.design.clone();
        design.schema_ids.clear();
        let mut next = DesignSnapshot::build(current.version + 1, design, &[])?;
        let ids: Vec<String> = found.into_iter().collect();
        for object in self.storage.get_many(&ids)? {
            match SchemaEntry::from_object(&object) {
                Ok(entry) => next = next.with_schema(entry),
                Err(e) => warn!(object_id = %object.id, error = %e, "skipping unusable schema"),
            }
        }
        self.persist_design_locked(next, true)
    }

    // ---- Reads ----

    /// The stored object, without the resolution hook.
    fn load(&self, id: &str) -> RepoResult<DigitalObject> {
        self.storage
            .get(id)?
            .ok_or_else(|| RepoError::NotFound(id.to_string()))
    }

    /// An object as a reader sees it, after the resolution hook.
    pub fn get_object(&self, id: &str, user_id: Option<&str>) -> RepoResult<DigitalObject> {
        let object = self.load(id)?;
        let ctx = HookContext {
            object_id: Some(id),
            user_id,
            is_new: false,
        };
        self.hooks.on_object_resolution(object, &ctx)
    }

    pub fn search(&self, query: &Query) -> RepoResult<Vec<DigitalObject>> {
        Ok(self.index.search(query)?)
    }

    pub fn search_handles(&self, query: &Query) -> RepoResult<Vec<String>> {
        Ok(self.index.search_handles(query)?)
    }

    /// Recompute an object's digests and compare with the recorded ones.
    pub fn verify_object(&self, id: &str) -> RepoResult<VerificationReport> {
        let object = self.load(id)?;
        hashing::verify(&object, self.storage.as_ref())
    }

    /// Pointer map of a stored object under its current schema. Objects of
    /// an unknown type have none.
    fn pointers_for(&self, object: &DigitalObject) -> (PointerMap, bool) {
        match self.design.load().schema(&object.object_type) {
            Some(entry) => (entry.validator.validate(&object.content).pointers, entry.index_payloads),
            None => (PointerMap::new(), true),
        }
    }

    // ---- Index consistency ----

    pub fn ensure_index_up_to_date(&self) -> RepoResult<()> {
        let covered = self.auth_changes.load(Ordering::SeqCst);
        self.index.ensure_up_to_date()?;
        self.index_covered.fetch_max(covered, Ordering::SeqCst);
        Ok(())
    }

    /// Barrier only if an auth change happened since the last one.
    pub fn ensure_index_up_to_date_when_auth_change(&self) -> RepoResult<()> {
        if self.auth_changes.load(Ordering::SeqCst) > self.index_covered.load(Ordering::SeqCst) {
            self.ensure_index_up_to_date()?;
        }
        Ok(())
    }

    // ---- Auth lookups ----

    /// Id of the (non-version) object claiming `username`, ignoring case.
    pub fn id_for_username(&self, username: &str) -> RepoResult<Option<String>> {
        if let Some(id) = self.auth_cache.id_for_username(username) {
            return Ok(Some(id));
        }
        self.ensure_index_up_to_date_when_auth_change()?;
        let query = Query::term_ignore_case(fields::USERNAME, username)
            .and(Query::term(fields::IS_VERSION, "false"));
        let id = self.index.search_handles(&query)?.into_iter().next();
        if let Some(id) = &id {
            self.auth_cache.set_id_for_username(username, id);
        }
        Ok(id)
    }

    /// Every group `user_id` belongs to, directly or transitively.
    pub fn groups_for_user(&self, user_id: &str) -> RepoResult<BTreeSet<String>> {
        if let Some(groups) = self.auth_cache.groups_for(user_id) {
            return Ok(groups);
        }
        self.ensure_index_up_to_date_when_auth_change()?;
        let mut groups = BTreeSet::new();
        let mut pending = vec![user_id.to_string()];
        while let Some(member) = pending.pop() {
            let query = Query::term(fields::USERS, member).and(Query::term(fields::IS_VERSION, "false"));
            for group in self.index.search_handles(&query)? {
                if group != user_id && groups.insert(group.clone()) {
                    pending.push(group);
                }
            }
        }
        self.auth_cache.set_groups_for(user_id, groups.clone());
        Ok(groups)
    }

    /// Recompute every username and group closure in one pass.
    ///
    /// Returns `false` without installing anything if another auth change
    /// landed while the pass ran.
    pub fn rebuild_auth_cache(&self) -> RepoResult<bool> {
        let started_at = self.auth_changes.load(Ordering::SeqCst);
        self.ensure_index_up_to_date()?;
        let objects = self.index.search(&Query::term(fields::IS_VERSION, "false"))?;
        let mut user_ids = HashMap::new();
        let mut direct: HashMap<String, BTreeSet<String>> = HashMap::new();
        for object in &objects {
            let md = &object.metadata;
            if let Some(username) = md.internal_str(internal::USERNAME) {
                user_ids.insert(username.to_string(), object.id.clone());
                direct.entry(object.id.clone()).or_default();
            }
            if let Some(users) = md.internal_str(internal::USERS) {
                direct.entry(object.id.clone()).or_default();
                for member in users.lines().filter(|l| !l.is_empty()) {
                    direct.entry(member.to_string()).or_default().insert(object.id.clone());
                }
            }
        }
        let groups = recursive_groups(&direct);
        if self.auth_changes.load(Ordering::SeqCst) != started_at {
            debug!("auth changed during precache, discarding");
            return Ok(false);
        }
        self.auth_cache.install(user_ids, groups);
        Ok(true)
    }

    fn precache_auth(&self) {
        match self.rebuild_auth_cache() {
            Ok(true) => debug!("auth cache rebuilt"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "auth precache failed"),
        }
    }

    // ---- Side effects ----

    /// A username or users list changed here or elsewhere.
    fn note_auth_change(&self) {
        self.auth_changes.fetch_add(1, Ordering::SeqCst);
        self.auth_cache.invalidate();
        self.precache.trigger();
    }

    fn signal_auth_change(&self) {
        self.note_auth_change();
        self.send_signal(Signal::AuthChange);
    }

    fn send_signal(&self, signal: Signal) {
        if let Err(e) = self.cluster.send_signal(signal) {
            warn!(?signal, error = %e, "failed to broadcast signal");
        }
    }

    fn clear_script_cache(&self) {
        self.hooks.clear_script_cache();
        self.send_signal(Signal::ScriptCacheClear);
    }

    fn invalidate_sessions(&self, user_id: &str) {
        let Some(sessions) = &self.sessions else {
            return;
        };
        if let Err(e) = sessions.invalidate_sessions_for(user_id) {
            warn!(user_id, error = %e, "session invalidation failed");
        }
    }

    /// Mirror a created or updated object into the name resolver.
    fn mirror_to_name_resolver(&self, object: &DigitalObject, is_new: bool) {
        let Some(resolver) = &self.name_resolver else {
            return;
        };
        let result = self.hooks.generate_handle_values(object).and_then(|values| {
            if is_new {
                resolver.register(object, &values)
            } else {
                resolver.update(object, &values)
            }
        });
        if let Err(e) = result {
            warn!(object_id = %object.id, error = %e, "name resolver update failed");
            self.alerter
                .alert(&format!("Failure to update handle record for {}, out of sync: {e}", object.id));
        }
    }

    fn remove_from_name_resolver(&self, id: &str) {
        let Some(resolver) = &self.name_resolver else {
            return;
        };
        if let Err(e) = resolver.delete(id) {
            warn!(object_id = %id, error = %e, "name resolver delete failed");
            self.alerter
                .alert(&format!("Failure to delete handle record for {id}, out of sync: {e}"));
        }
    }

    // ---- Transactions ----

    /// Run `work` inside a ledger transaction on `object_id`.
    ///
    /// On success the transaction is closed. On failure it is handed to the
    /// reprocessing queue and the error returned.
    fn in_transaction<T>(
        &self,
        object_id: &str,
        operation: TxnOperation,
        needs_replicate: bool,
        work: impl FnOnce(&TransactionRecord) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let txn = self.ledger.open(self.member_id(), object_id, operation, needs_replicate)?;
        let result = work(&txn).and_then(|value| {
            self.ledger.close(txn.txn_id, self.member_id())?;
            Ok(value)
        });
        if let Err(e) = &result {
            self.divert(&txn, e);
        }
        result
    }

    fn divert(&self, txn: &TransactionRecord, cause: &RepoError) {
        error!(
            txn_id = txn.txn_id,
            object_id = %txn.object_id,
            error = %cause,
            "transaction failed, diverting to reprocessing queue"
        );
        if let Err(e) = self.queue.insert(txn, self.member_id()) {
            // The fallback queue kept it; the ledger entry stays open for it.
            error!(txn_id = txn.txn_id, error = %e, "could not queue failed transaction");
            return;
        }
        if let Err(e) = self.ledger.close(txn.txn_id, self.member_id()) {
            error!(txn_id = txn.txn_id, error = %e, "could not close diverted transaction");
        }
    }

    /// Index `object` and, when asked, publish it for replication.
    fn publish_derived(
        &self,
        object: &DigitalObject,
        index_payloads: bool,
        pointers: &PointerMap,
        needs_replicate: bool,
    ) -> RepoResult<()> {
        self.index.index_object(self.member_id(), object, index_payloads, pointers)?;
        if needs_replicate {
            self.replicate_update(object)?;
        }
        Ok(())
    }

    fn replicate_update(&self, object: &DigitalObject) -> RepoResult<()> {
        let Some(producer) = &self.replication else {
            return Ok(());
        };
        let include_payloads = self.design.load().design.include_payloads_in_replication;
        let message =
            ReplicationMessage::update(&self.config.cluster_id, object, include_payloads, self.storage.as_ref())?;
        producer.send(&object.id, &message.to_json()?)
    }

    fn replicate_delete(&self, id: &str) -> RepoResult<()> {
        let Some(producer) = &self.replication else {
            return Ok(());
        };
        producer.send(id, &ReplicationMessage::delete(&self.config.cluster_id, id).to_json()?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("member_id", &self.member_id())
            .field("read_only", &self.config.read_only)
            .field("design_version", &self.design.load().version)
            .finish()
    }
}
