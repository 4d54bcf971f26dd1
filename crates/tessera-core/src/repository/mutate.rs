use serde_json::Value;
use tessera_gate::stages::auto_fields::ANONYMOUS;
use tessera_gate::{auth, check_handle_references, validate_payloads, StageContext};
use tessera_ledger::TxnOperation;
use tessera_schema::{pointer, Annotation, PointerMap};
use tessera_sync::NameGuard;
use tessera_types::{
    internal, validate_handle, AccessControlList, DigitalObject, Timestamp, DESIGN_OBJECT_ID, SCHEMA_TYPE,
};
use tracing::error;

use super::lookups::RepoLookups;
use super::{Repository, WriteOptions, SCHEMA_NAME_LOCK, USERNAME_LOCK};
use crate::design::{DesignSnapshot, SchemaEntry};
use crate::error::{RepoError, RepoResult};
use crate::hashing;
use crate::hooks::{HookContext, ObjectDelta};

/// Validate `content` and return its pointer map.
pub(super) fn validate_content(entry: &SchemaEntry, content: &Value) -> RepoResult<PointerMap> {
    let report = entry.validator.validate(content);
    if let Some(err) = report.first_error() {
        return Err(RepoError::invalid_at(err.pointer.clone(), err.message.clone()));
    }
    Ok(report.pointers)
}

/// Text of the first primary-preview field, if non-empty.
fn primary_preview_text(content: &Value, pointers: &PointerMap) -> Option<String> {
    let (ptr, _) = pointers
        .find(|a| matches!(a, Annotation::PrimaryPreview))
        .into_iter()
        .next()?;
    let text = match pointer::get(content, ptr)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

pub(super) fn uses_scripts(object: &DigitalObject, pointers: &PointerMap) -> bool {
    pointers.any(|a| matches!(a, Annotation::ScriptPayloadReference))
        || (object.object_type == SCHEMA_TYPE && object.content.get("javascript").is_some())
}

impl Repository {
    // ---- Create / update ----

    pub fn create(&self, delta: ObjectDelta, options: &WriteOptions<'_>) -> RepoResult<DigitalObject> {
        if !options.dry_run {
            self.check_writable()?;
        }
        let requested_id = delta.id.clone();
        let hook_ctx = HookContext {
            object_id: requested_id.as_deref(),
            user_id: options.user_id,
            is_new: true,
        };
        let delta = self.hooks.before_schema_validation(None, delta, &hook_ctx)?;
        if delta.id.as_deref() == Some(DESIGN_OBJECT_ID) {
            return Err(RepoError::BadRequest(format!("Object id {DESIGN_OBJECT_ID} is reserved")));
        }
        let object_type = delta
            .object_type
            .clone()
            .ok_or_else(|| RepoError::invalid("Missing object type"))?;
        let content = delta
            .content
            .clone()
            .ok_or_else(|| RepoError::invalid("Missing content"))?;

        let design = self.design.load();
        let entry = design
            .schema(&object_type)
            .ok_or_else(|| RepoError::invalid(format!("Unknown type {object_type}")))?;
        let pointers = validate_content(entry, &content)?;
        validate_payloads(&delta.payloads)?;
        if let Some(id) = &delta.id {
            validate_handle(id)?;
        }

        let (id, _guard) = self.claim_new_id(&delta, &content, &pointers, design.minting_prefix(), &hook_ctx)?;
        let now = Timestamp::now();
        let user = options.user_id.unwrap_or(ANONYMOUS).to_string();
        let mut object = DigitalObject::new(id, object_type, content);
        object.acl = delta.acl;
        object.user_metadata = delta.user_metadata;
        object.payloads = delta.payloads;
        object.metadata.created_on = Some(now);
        object.metadata.created_by = Some(user.clone());
        object.metadata.modified_on = Some(now);
        object.metadata.modified_by = Some(user);

        self.process_and_write(object, None, &design, entry, pointers, options, now)
    }

    pub fn update(&self, delta: ObjectDelta, options: &WriteOptions<'_>) -> RepoResult<DigitalObject> {
        if !options.dry_run {
            self.check_writable()?;
        }
        let id = delta
            .id
            .clone()
            .ok_or_else(|| RepoError::BadRequest("Missing object id".into()))?;
        if id == DESIGN_OBJECT_ID {
            return Err(RepoError::BadRequest(
                "The design object is changed through update_design".into(),
            ));
        }

        let _guard = self.locker.acquire(&id)?;
        let existing = self.load(&id)?;
        let design = self.design.load();
        if existing.metadata.is_version && !design.design.enable_version_edits {
            return Err(RepoError::BadRequest("Objects versions cannot be edited".into()));
        }

        let hook_ctx = HookContext {
            object_id: Some(&id),
            user_id: options.user_id,
            is_new: false,
        };
        let ObjectDelta {
            object_type,
            content,
            acl,
            user_metadata,
            payloads,
            payloads_to_delete,
            ..
        } = self.hooks.before_schema_validation(Some(&existing), delta, &hook_ctx)?;
        let object_type = object_type.unwrap_or_else(|| existing.object_type.clone());
        let content = content.unwrap_or_else(|| existing.content.clone());

        let entry = design
            .schema(&object_type)
            .ok_or_else(|| RepoError::invalid(format!("Unknown type {object_type}")))?;
        let pointers = validate_content(entry, &content)?;
        validate_payloads(&payloads)?;

        let now = Timestamp::now();
        let mut object = existing.clone();
        object.object_type = object_type;
        object.content = content;
        if acl.is_some() {
            object.acl = acl;
        }
        if user_metadata.is_some() {
            object.user_metadata = user_metadata;
        }
        object.payloads.retain(|p| !payloads_to_delete.contains(&p.name));
        for payload in payloads {
            match object.payloads.iter_mut().find(|p| p.name == payload.name) {
                Some(slot) => *slot = payload,
                None => object.payloads.push(payload),
            }
        }
        object.metadata.modified_on = Some(now);
        object.metadata.modified_by = Some(options.user_id.unwrap_or(ANONYMOUS).to_string());

        self.process_and_write(object, Some(&existing), &design, entry, pointers, options, now)
    }

    /// Replace only the ACL.
    pub fn update_acls(
        &self,
        id: &str,
        acl: AccessControlList,
        options: &WriteOptions<'_>,
    ) -> RepoResult<DigitalObject> {
        self.update(ObjectDelta::update(id).with_acl(acl), options)
    }

    /// Lock a fresh id: the caller's, a hook's, one derived from the primary
    /// preview field, or finally one from the clock.
    fn claim_new_id(
        &self,
        delta: &ObjectDelta,
        content: &Value,
        pointers: &PointerMap,
        prefix: &str,
        hook_ctx: &HookContext<'_>,
    ) -> RepoResult<(String, NameGuard<'_>)> {
        if let Some(id) = &delta.id {
            return match self.lock_if_free(id)? {
                Some(guard) => Ok((id.clone(), guard)),
                None => Err(RepoError::Conflict(format!("Object already exists: {id}"))),
            };
        }
        while let Some(generated) = self.hooks.generate_id(delta, hook_ctx)? {
            validate_handle(&generated.id)?;
            if let Some(guard) = self.lock_if_free(&generated.id)? {
                return Ok((generated.id, guard));
            }
            if !generated.loopable {
                return Err(RepoError::Conflict(format!("Object already exists: {}", generated.id)));
            }
        }
        if let Some(text) = primary_preview_text(content, pointers) {
            let id = self.minter.mint(prefix, &text);
            if let Some(guard) = self.lock_if_free(&id)? {
                return Ok((id, guard));
            }
        }
        loop {
            let id = self.minter.mint_by_timestamp(prefix);
            if let Some(guard) = self.lock_if_free(&id)? {
                return Ok((id, guard));
            }
        }
    }

    /// Lock `id` and keep the lock only if nothing is stored there.
    pub(super) fn lock_if_free(&self, id: &str) -> RepoResult<Option<NameGuard<'_>>> {
        let guard = self.locker.acquire(id)?;
        if self.storage.exists(id)? {
            return Ok(None);
        }
        Ok(Some(guard))
    }

    /// Field pipeline, reference check, then the transactional write and
    /// its side effects. The caller holds the object lock.
    #[allow(clippy::too_many_arguments)]
    fn process_and_write(
        &self,
        mut object: DigitalObject,
        existing: Option<&DigitalObject>,
        design: &DesignSnapshot,
        entry: &SchemaEntry,
        pointers: PointerMap,
        options: &WriteOptions<'_>,
        now: Timestamp,
    ) -> RepoResult<DigitalObject> {
        let is_schema = object.object_type == SCHEMA_TYPE;
        let schema_guard = if is_schema {
            Some(self.locker.acquire(SCHEMA_NAME_LOCK)?)
        } else {
            None
        };
        let username_guard = if auth::is_user(&pointers) {
            Some(self.locker.acquire(USERNAME_LOCK)?)
        } else {
            None
        };

        let prefix = design.minting_prefix();
        let settings = self.config.pipeline_settings(Some(prefix));
        let lookups = RepoLookups::new(self);
        let mut json = std::mem::take(&mut object.content);
        let outcome = self.pipeline.run(&mut StageContext {
            json: &mut json,
            schema: entry.validator.schema(),
            pointers: &pointers,
            object: &mut object,
            acting_user: options.user_id,
            now,
            settings: &settings,
            lookups: &lookups,
        })?;
        check_handle_references(&json, &pointers, Some(prefix), &lookups)?;
        object.content = json;
        let compiled = if is_schema {
            Some(SchemaEntry::from_object(&object)?)
        } else {
            None
        };

        if options.dry_run {
            return Ok(object);
        }

        let stored = self.write_object(object, existing.is_none(), entry, &pointers)?;
        if let Some(compiled) = compiled {
            self.register_schema(&stored.id, compiled, true);
        }
        drop(username_guard);
        drop(schema_guard);

        self.after_write(&stored, existing, &pointers, outcome.changed_auth);
        Ok(stored)
    }

    pub(super) fn write_object(
        &self,
        mut object: DigitalObject,
        is_create: bool,
        entry: &SchemaEntry,
        pointers: &PointerMap,
    ) -> RepoResult<DigitalObject> {
        let id = object.id.clone();
        self.in_transaction(&id, TxnOperation::Update, true, |txn| {
            object.metadata.txn_id = Some(txn.txn_id);
            if entry.hash_object {
                hashing::stamp(&mut object, self.storage.as_ref())?;
            }
            let stored = if is_create {
                self.storage.create(object)?
            } else {
                self.storage.update(object)?
            };
            if let Err(e) = self.publish_derived(&stored, entry.index_payloads, pointers, true) {
                if is_create {
                    self.delete_half_created(&stored.id);
                }
                return Err(e);
            }
            Ok(stored)
        })
    }

    fn delete_half_created(&self, id: &str) {
        if let Err(e) = self.storage.delete(id) {
            error!(object_id = %id, error = %e, "could not remove object after failed creation");
            self.alerter
                .alert(&format!("Failure to delete new object after creation error: {id}, out of sync"));
        }
    }

    /// Install a compiled schema in the registry and persist the registry.
    pub(super) fn register_schema(&self, id: &str, entry: SchemaEntry, needs_replicate: bool) {
        let result = self.design_locker.write().map_err(RepoError::from).and_then(|_write| {
            let next = self.design.load().with_schema(entry);
            self.persist_design_locked(next, needs_replicate)
        });
        if let Err(e) = result {
            error!(object_id = %id, error = %e, "schema registry update failed");
            self.alerter
                .alert(&format!("Failure to register schema {id}, out of sync: {e}"));
        }
    }

    pub(super) fn after_write(
        &self,
        stored: &DigitalObject,
        existing: Option<&DigitalObject>,
        pointers: &PointerMap,
        auth_changed: bool,
    ) {
        if auth_changed {
            self.signal_auth_change();
        }
        if auth::is_user(pointers) && !auth::is_account_active(&stored.content, pointers) {
            let was_active = existing.is_some_and(|e| auth::is_account_active(&e.content, pointers));
            if was_active {
                self.invalidate_sessions(&stored.id);
            }
        }
        if uses_scripts(stored, pointers) {
            self.clear_script_cache();
        }
        self.mirror_to_name_resolver(stored, existing.is_none());
    }

    // ---- Delete ----

    pub fn delete(&self, id: &str, options: &WriteOptions<'_>) -> RepoResult<()> {
        self.delete_object(id, options.user_id, true)
    }

    /// Delete locally. With `needs_replicate` off this applies a delete
    /// that originated elsewhere: no hook, no read-only check, and a
    /// missing object is not an error.
    pub(super) fn delete_object(&self, id: &str, user_id: Option<&str>, needs_replicate: bool) -> RepoResult<()> {
        if needs_replicate {
            self.check_writable()?;
        }
        if id == DESIGN_OBJECT_ID {
            return Err(RepoError::BadRequest("The design object cannot be deleted".into()));
        }
        let _guard = self.locker.acquire(id)?;
        let existing = self.storage.get(id)?;
        if needs_replicate {
            let Some(object) = &existing else {
                return Err(RepoError::NotFound(id.to_string()));
            };
            let ctx = HookContext {
                object_id: Some(id),
                user_id,
                is_new: false,
            };
            self.hooks.before_delete(object, &ctx)?;
        }

        self.in_transaction(id, TxnOperation::Delete, needs_replicate, |_txn| {
            match &existing {
                Some(object) if object.object_type == SCHEMA_TYPE => {
                    let _write = self.design_locker.write()?;
                    self.storage.delete(id)?;
                    let next = self.design.load().without_schema(id);
                    self.persist_design_locked(next, needs_replicate)?;
                }
                Some(_) => self.storage.delete(id)?,
                None => {}
            }
            self.remove_from_name_resolver(id);
            self.index.delete_object(id)?;
            if needs_replicate {
                self.replicate_delete(id)?;
            }
            Ok(())
        })?;

        if let Some(object) = existing {
            let md = &object.metadata;
            if md.internal_str(internal::USERNAME).is_some() || md.internal_str(internal::USERS).is_some() {
                self.signal_auth_change();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use tessera_ledger::ReprocessingQueue;
    use tessera_types::Payload;

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    #[test]
    fn create_then_get_round_trips_content() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let content = json!({"title": "hello", "tags": ["a", "b"], "n": 3});
        let created = repo
            .create(ObjectDelta::create("Doc", content.clone()), &WriteOptions::as_user("someone"))
            .unwrap();
        let fetched = repo.get_object(&created.id, None).unwrap();
        assert_eq!(fetched.content, content);
        assert_eq!(fetched.metadata.created_by.as_deref(), Some("someone"));
        assert!(fetched.metadata.txn_id.is_some());
        assert!(created.id.starts_with("test/"));
    }

    #[test]
    fn user_example_hashes_password_and_claims_username() {
        let repo = repo();
        define_user_and_group_schemas(&repo);
        let alice = create_user(&repo, "alice", "secret123");
        assert_eq!(alice.content["password"], "");
        let md = &alice.metadata;
        assert!(md.internal_str(internal::HASH).is_some());
        assert!(md.internal_str(internal::SALT).is_some());
        assert_eq!(md.internal_str(internal::USERNAME), Some("alice"));

        let err = repo
            .create(
                ObjectDelta::create("User", json!({"username": "Alice", "password": "other123"})),
                &WriteOptions::anonymous(),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::Invalid { .. }));
        assert_eq!(err.pointer(), Some("/username"));
    }

    #[test]
    fn caller_supplied_id_conflicts_instead_of_retrying() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let delta = ObjectDelta::create("Doc", json!({})).with_id("test/fixed");
        repo.create(delta.clone(), &WriteOptions::anonymous()).unwrap();
        let err = repo.create(delta, &WriteOptions::anonymous()).unwrap_err();
        assert!(matches!(err, RepoError::Conflict(ref m) if m == "Object already exists: test/fixed"));
    }

    #[test]
    fn invalid_input_is_rejected_before_any_write() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object", "required": ["title"]}));
        let stored_before = repo.storage().list_ids().unwrap().len();

        let err = repo
            .create(ObjectDelta::create("Doc", json!({})), &WriteOptions::anonymous())
            .unwrap_err();
        assert!(matches!(err, RepoError::Invalid { .. }));
        let err = repo
            .create(ObjectDelta::create("Nope", json!({})), &WriteOptions::anonymous())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown type Nope");
        let err = repo
            .create(
                ObjectDelta::create("Doc", json!({"title": "x"})).with_id("no-slash"),
                &WriteOptions::anonymous(),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::BadRequest(_)));

        assert_eq!(repo.storage().list_ids().unwrap().len(), stored_before);
        assert!(repo.ledger().members_with_open_transactions().unwrap().is_empty());
    }

    #[test]
    fn primary_preview_field_derives_the_id() {
        let repo = repo();
        define_schema(
            &repo,
            "Named",
            json!({"type": "object", "properties": {"name": {"type": "string", "cordra": {"preview": {"isPrimary": true}}}}}),
        );
        let a = repo
            .create(ObjectDelta::create("Named", json!({"name": "alpha"})), &WriteOptions::anonymous())
            .unwrap();
        assert_eq!(a.id, repo.minter.mint("test", "alpha"));
        // Taken: falls back to a clock-derived id.
        let b = repo
            .create(ObjectDelta::create("Named", json!({"name": "alpha"})), &WriteOptions::anonymous())
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn concurrent_creates_get_distinct_ids() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                thread::spawn(move || {
                    (0..25)
                        .map(|j| {
                            repo.create(ObjectDelta::create("Doc", json!({"i": i, "j": j})), &WriteOptions::anonymous())
                                .unwrap()
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn dry_run_persists_nothing() {
        let repo = read_only_repo_with(&[("Doc", json!({"type": "object"}))]);
        let out = repo
            .create(
                ObjectDelta::create("Doc", json!({"a": 1})).with_id("test/dry"),
                &WriteOptions::anonymous().dry_run(),
            )
            .unwrap();
        assert_eq!(out.id, "test/dry");
        assert!(repo.storage().get("test/dry").unwrap().is_none());
        let err = repo
            .create(ObjectDelta::create("Doc", json!({})), &WriteOptions::anonymous())
            .unwrap_err();
        assert!(matches!(err, RepoError::ReadOnly));
    }

    #[test]
    fn hash_object_types_are_stamped() {
        let repo = repo();
        define_hashed_schema(&repo, "Signed");
        let created = repo
            .create(
                ObjectDelta::create("Signed", json!({"a": 1})).with_payload(Payload::pending("p", b"bytes".to_vec())),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        let hashes = created.metadata.hashes.as_ref().unwrap();
        assert!(hashes.payloads.contains_key("p"));
        assert!(repo.verify_object(&created.id).unwrap().is_intact());
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    #[test]
    fn empty_password_keeps_the_hash() {
        let repo = repo();
        define_user_and_group_schemas(&repo);
        let alice = create_user(&repo, "alice", "secret123");
        let original = alice.metadata.internal_str(internal::HASH).unwrap().to_string();

        let same = repo
            .update(
                ObjectDelta::update(&alice.id).with_content(json!({"username": "alice", "password": ""})),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        assert_eq!(same.metadata.internal_str(internal::HASH), Some(original.as_str()));
        assert!(repo.check_user_password(&alice.id, "secret123").unwrap());

        let changed = repo
            .update(
                ObjectDelta::update(&alice.id).with_content(json!({"username": "alice", "password": "another1"})),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        assert_ne!(changed.metadata.internal_str(internal::HASH), Some(original.as_str()));
        assert!(repo.check_user_password(&alice.id, "another1").unwrap());
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let id = repo
            .create(ObjectDelta::create("Doc", json!({})), &WriteOptions::anonymous())
            .unwrap()
            .id;
        let states: Vec<serde_json::Value> = (0..2)
            .map(|w| json!({"writer": w, "fields": (0..50).map(|k| format!("{w}-{k}")).collect::<Vec<_>>()}))
            .collect();
        let handles: Vec<_> = states
            .iter()
            .cloned()
            .map(|state| {
                let repo = Arc::clone(&repo);
                let id = id.clone();
                thread::spawn(move || {
                    repo.update(ObjectDelta::update(id).with_content(state), &WriteOptions::anonymous())
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let final_content = repo.get_object(&id, None).unwrap().content;
        assert!(states.contains(&final_content));
    }

    #[test]
    fn payload_delta_adds_replaces_and_deletes() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let created = repo
            .create(
                ObjectDelta::create("Doc", json!({}))
                    .with_payload(Payload::pending("keep", b"k".to_vec()))
                    .with_payload(Payload::pending("drop", b"d".to_vec())),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        let updated = repo
            .update(
                ObjectDelta::update(&created.id)
                    .deleting_payload("drop")
                    .with_payload(Payload::pending("new", b"fresh".to_vec())),
                &WriteOptions::anonymous(),
            )
            .unwrap();
        let names: Vec<&str> = updated.payloads.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["keep", "new"]);
        assert_eq!(repo.get_payload(&created.id, "keep").unwrap().as_ref(), b"k");
        assert!(matches!(repo.get_payload(&created.id, "drop"), Err(RepoError::NotFound(_))));
    }

    #[test]
    fn update_acls_touches_only_the_acl() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let created = repo
            .create(ObjectDelta::create("Doc", json!({"a": 1})), &WriteOptions::anonymous())
            .unwrap();
        let acl = AccessControlList::new(vec!["test/reader".into()], vec![]);
        let updated = repo
            .update_acls(&created.id, acl.clone(), &WriteOptions::anonymous())
            .unwrap();
        assert_eq!(updated.acl, Some(acl));
        assert_eq!(updated.content, json!({"a": 1}));
    }

    #[test]
    fn updating_a_missing_object_is_not_found() {
        let repo = repo();
        let err = repo
            .update(ObjectDelta::update("test/none"), &WriteOptions::anonymous())
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }

    // -----------------------------------------------------------------------
    // Failure diversion
    // -----------------------------------------------------------------------

    #[test]
    fn index_failure_removes_new_object_and_queues_the_transaction() {
        let (repo, index) = repo_with_failing_index();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        index.fail(true);
        let err = repo
            .create(ObjectDelta::create("Doc", json!({})).with_id("test/x"), &WriteOptions::anonymous())
            .unwrap_err();
        assert!(matches!(err, RepoError::Internal(_)));
        assert!(repo.storage().get("test/x").unwrap().is_none());
        let queued = repo.reprocessing_queue().pending().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].record.object_id, "test/x");
        assert!(repo
            .ledger()
            .open_transactions(repo.member_id())
            .unwrap()
            .is_empty());
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    #[test]
    fn delete_removes_object_and_index_entry() {
        let (repo, index) = repo_with_index();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let created = repo
            .create(ObjectDelta::create("Doc", json!({})), &WriteOptions::anonymous())
            .unwrap();
        assert!(index.document(&created.id).is_some());
        repo.delete(&created.id, &WriteOptions::anonymous()).unwrap();
        assert!(repo.storage().get(&created.id).unwrap().is_none());
        assert!(index.document(&created.id).is_none());
        assert!(matches!(
            repo.delete(&created.id, &WriteOptions::anonymous()),
            Err(RepoError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_a_schema_unregisters_it() {
        let repo = repo();
        let schema = define_schema(&repo, "Doc", json!({"type": "object"}));
        repo.delete(&schema.id, &WriteOptions::anonymous()).unwrap();
        assert!(repo.design().schema("Doc").is_none());
        assert!(repo.design().design.schema_ids.is_empty());
    }

    #[test]
    fn duplicate_schema_names_are_rejected() {
        let repo = repo();
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let err = repo
            .create(
                ObjectDelta::create(SCHEMA_TYPE, json!({"name": "Doc", "schema": {"type": "object"}})),
                &WriteOptions::anonymous(),
            )
            .unwrap_err();
        assert_eq!(err.pointer(), Some("/name"));
    }

    #[test]
    fn before_delete_hook_can_veto() {
        let repo = repo_with_hooks(Arc::new(VetoDeletes));
        define_schema(&repo, "Doc", json!({"type": "object"}));
        let created = repo
            .create(ObjectDelta::create("Doc", json!({})), &WriteOptions::anonymous())
            .unwrap();
        assert!(matches!(
            repo.delete(&created.id, &WriteOptions::anonymous()),
            Err(RepoError::Forbidden(_))
        ));
        assert!(repo.storage().exists(&created.id).unwrap());
    }
}
