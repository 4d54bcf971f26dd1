use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tessera_schema::PointerMap;
use tessera_store::Storage;
use tessera_types::DigitalObject;
use tracing::{debug, warn};

use crate::document::{IndexDocument, PayloadIndexState};
use crate::error::{IndexError, IndexResult};
use crate::query::Query;
use crate::traits::Indexer;

/// In-memory index backed by a `BTreeMap` keyed by object id.
///
/// Payload text is read from an optional storage handle. When payload
/// indexing is deferred the entry stays marked "in process" for the member
/// that wrote it, which is what a crash mid-indexing leaves behind.
pub struct InMemoryIndex {
    docs: RwLock<BTreeMap<String, IndexDocument>>,
    payload_source: Option<Arc<dyn Storage>>,
    defer_payloads: AtomicBool,
    barriers: AtomicU64,
}

impl InMemoryIndex {
    /// Create an empty index that does not read payload bytes.
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            payload_source: None,
            defer_payloads: AtomicBool::new(false),
            barriers: AtomicU64::new(0),
        }
    }

    /// Create an empty index that indexes UTF-8 payload text from `storage`.
    pub fn with_payload_source(storage: Arc<dyn Storage>) -> Self {
        Self {
            payload_source: Some(storage),
            ..Self::new()
        }
    }

    /// Leave payload indexing "in process" instead of finishing it.
    pub fn set_defer_payloads(&self, defer: bool) {
        self.defer_payloads.store(defer, Ordering::SeqCst);
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().expect("lock poisoned").is_empty()
    }

    /// The indexed document for `id`, if any.
    pub fn document(&self, id: &str) -> Option<IndexDocument> {
        self.docs.read().expect("lock poisoned").get(id).cloned()
    }

    /// How many times [`Indexer::ensure_up_to_date`] has been called.
    pub fn barrier_count(&self) -> u64 {
        self.barriers.load(Ordering::SeqCst)
    }

    fn add_payload_text(&self, doc: &mut IndexDocument) -> IndexResult<()> {
        let Some(storage) = &self.payload_source else {
            return Ok(());
        };
        let names: Vec<String> = doc.object.payloads.iter().map(|p| p.name.clone()).collect();
        for name in names {
            let bytes = storage
                .get_payload(doc.id(), &name)
                .map_err(|e| IndexError::PayloadRead(e.to_string()))?;
            match bytes.as_deref().map(std::str::from_utf8) {
                Some(Ok(text)) => doc.add_payload_text(&name, text),
                Some(Err(_)) => debug!(object_id = %doc.id(), payload = %name, "skipping binary payload"),
                None => warn!(object_id = %doc.id(), payload = %name, "payload bytes missing while indexing"),
            }
        }
        Ok(())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for InMemoryIndex {
    fn index_object(
        &self,
        member_id: &str,
        object: &DigitalObject,
        index_payloads: bool,
        pointers: &PointerMap,
    ) -> IndexResult<()> {
        let mut doc = IndexDocument::build(object);
        doc.add_references(pointers);
        if index_payloads && !object.payloads.is_empty() {
            if self.defer_payloads.load(Ordering::SeqCst) {
                doc.mark_payloads(PayloadIndexState::InProcess, member_id);
            } else {
                self.add_payload_text(&mut doc)?;
                doc.mark_payloads(PayloadIndexState::Complete, member_id);
            }
        }
        self.docs
            .write()
            .expect("lock poisoned")
            .insert(object.id.clone(), doc);
        Ok(())
    }

    fn delete_object(&self, id: &str) -> IndexResult<()> {
        self.docs.write().expect("lock poisoned").remove(id);
        Ok(())
    }

    fn search(&self, query: &Query) -> IndexResult<Vec<DigitalObject>> {
        let docs = self.docs.read().expect("lock poisoned");
        Ok(docs
            .values()
            .filter(|d| query.matches(d))
            .map(|d| d.object.clone())
            .collect())
    }

    fn search_handles(&self, query: &Query) -> IndexResult<Vec<String>> {
        let docs = self.docs.read().expect("lock poisoned");
        Ok(docs
            .values()
            .filter(|d| query.matches(d))
            .map(|d| d.id().to_string())
            .collect())
    }

    fn ensure_up_to_date(&self) -> IndexResult<()> {
        self.barriers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("document_count", &self.len())
            .field("reads_payloads", &self.payload_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fields;
    use serde_json::json;
    use tessera_schema::SchemaValidator;
    use tessera_store::InMemoryStorage;
    use tessera_types::Payload;

    fn make_object(id: &str, ty: &str) -> DigitalObject {
        DigitalObject::new(id, ty, json!({"name": id}))
    }

    #[test]
    fn index_search_delete() {
        let index = InMemoryIndex::new();
        let none = PointerMap::new();
        index.index_object("m1", &make_object("test/a", "User"), true, &none).unwrap();
        index.index_object("m1", &make_object("test/b", "Group"), true, &none).unwrap();

        let users = index.search(&Query::term("type", "User")).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "test/a");

        index.delete_object("test/a").unwrap();
        index.delete_object("test/a").unwrap();
        assert_eq!(index.search_handles(&Query::All).unwrap(), vec!["test/b".to_string()]);
    }

    #[test]
    fn reindexing_replaces_entry() {
        let index = InMemoryIndex::new();
        let none = PointerMap::new();
        let mut obj = make_object("test/a", "User");
        index.index_object("m1", &obj, true, &none).unwrap();
        obj.content = json!({"name": "renamed"});
        index.index_object("m1", &obj, true, &none).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.search(&Query::term("/name", "test/a")).unwrap().is_empty());
        assert_eq!(index.search(&Query::term("/name", "renamed")).unwrap().len(), 1);
    }

    #[test]
    fn payload_text_is_indexed_from_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut obj = make_object("test/a", "Doc");
        obj.payloads.push(Payload::pending("readme", b"hello world".to_vec()));
        let stored = storage.create(obj).unwrap();

        let index = InMemoryIndex::with_payload_source(storage);
        index.index_object("m1", &stored, true, &PointerMap::new()).unwrap();
        let doc = index.document("test/a").unwrap();
        assert_eq!(doc.values("payload/readme"), ["hello world"]);
        assert_eq!(doc.values(fields::PAYLOAD_INDEX_STATE), ["indexComplete"]);
    }

    #[test]
    fn deferred_payloads_stay_in_process() {
        let index = InMemoryIndex::new();
        index.set_defer_payloads(true);
        let mut obj = make_object("test/a", "Doc");
        obj.payloads.push(Payload::pending("p", b"x".to_vec()));
        index.index_object("m1", &obj, true, &PointerMap::new()).unwrap();

        let stuck = Query::term(fields::PAYLOAD_INDEX_STATE, PayloadIndexState::InProcess.as_str())
            .and(Query::term(fields::PAYLOAD_INDEX_MEMBER, "m2").not());
        assert_eq!(index.search_handles(&stuck).unwrap(), vec!["test/a".to_string()]);

        // Objects without payloads never enter the in-process state.
        index.index_object("m1", &make_object("test/b", "Doc"), true, &PointerMap::new()).unwrap();
        assert_eq!(index.search_handles(&stuck).unwrap().len(), 1);
    }

    #[test]
    fn handle_references_are_indexed() {
        let schema = json!({
            "type": "object",
            "properties": {"owner": {"type": "string", "cordra": {"type": {"handleReference": {"types": ["User"]}}}}}
        });
        let obj = DigitalObject::new("test/a", "Doc", json!({"owner": "test/u1"}));
        let report = SchemaValidator::new(schema).unwrap().validate(&obj.content);
        let index = InMemoryIndex::new();
        index.index_object("m1", &obj, false, &report.pointers).unwrap();
        assert_eq!(
            index.search_handles(&Query::term(fields::REFERENCES, "test/u1")).unwrap(),
            vec!["test/a".to_string()]
        );
    }

    #[test]
    fn barrier_is_counted() {
        let index = InMemoryIndex::new();
        index.ensure_up_to_date().unwrap();
        index.ensure_up_to_date().unwrap();
        assert_eq!(index.barrier_count(), 2);
    }
}
