use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tessera_types::{DigitalObject, PayloadSource};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::Storage;

/// A stored object together with its payload bytes.
#[derive(Clone)]
struct Entry {
    object: DigitalObject,
    payloads: HashMap<String, Bytes>,
}

/// In-memory, HashMap-based storage.
///
/// Intended for tests and embedding. Objects are held behind a `RwLock` and
/// cloned on read/write; payload bytes are reference-counted `Bytes`.
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStorage {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Overwrite stored payload bytes in place, bypassing immutability.
    ///
    /// Exists so integrity audits can be exercised against tampered data.
    pub fn tamper_payload(&self, id: &str, name: &str, data: impl Into<Bytes>) -> bool {
        let mut map = self.entries.write().expect("lock poisoned");
        match map.get_mut(id).and_then(|e| e.payloads.get_mut(name)) {
            Some(bytes) => {
                *bytes = data.into();
                true
            }
            None => false,
        }
    }

    /// Make `object`'s payloads durable against the previous payload set.
    fn persist(object: DigitalObject, previous: Option<&Entry>) -> StoreResult<Entry> {
        let mut object = object;
        let mut payloads = HashMap::with_capacity(object.payloads.len());
        for payload in &mut object.payloads {
            let data = match std::mem::take(&mut payload.source) {
                PayloadSource::Pending(data) => data,
                PayloadSource::Stored => previous
                    .and_then(|e| e.payloads.get(&payload.name))
                    .cloned()
                    .ok_or_else(|| StoreError::MissingPayloadBytes {
                        id: object.id.clone(),
                        payload: payload.name.clone(),
                    })?,
            };
            payload.size = data.len() as u64;
            payloads.insert(payload.name.clone(), data);
        }
        Ok(Entry { object, payloads })
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, id: &str) -> StoreResult<Option<DigitalObject>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(id).map(|e| e.object.clone()))
    }

    fn create(&self, object: DigitalObject) -> StoreResult<DigitalObject> {
        let mut map = self.entries.write().expect("lock poisoned");
        if map.contains_key(&object.id) {
            return Err(StoreError::Conflict(object.id));
        }
        let entry = Self::persist(object, None)?;
        let stored = entry.object.clone();
        debug!(object_id = %stored.id, payloads = entry.payloads.len(), "stored new object");
        map.insert(stored.id.clone(), entry);
        Ok(stored)
    }

    fn update(&self, object: DigitalObject) -> StoreResult<DigitalObject> {
        let mut map = self.entries.write().expect("lock poisoned");
        let previous = map
            .get(&object.id)
            .ok_or_else(|| StoreError::NotFound(object.id.clone()))?;
        let entry = Self::persist(object, Some(previous))?;
        let stored = entry.object.clone();
        map.insert(stored.id.clone(), entry);
        Ok(stored)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        match map.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn get_payload(&self, id: &str, name: &str) -> StoreResult<Option<Bytes>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(id).and_then(|e| e.payloads.get(name)).cloned())
    }

    fn list_ids(&self) -> StoreResult<Vec<String>> {
        let map = self.entries.read().expect("lock poisoned");
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_types::Payload;

    fn make_object(id: &str) -> DigitalObject {
        DigitalObject::new(id, "Document", json!({"title": "t"}))
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    #[test]
    fn create_then_get() {
        let store = InMemoryStorage::new();
        store.create(make_object("test/1")).unwrap();
        let got = store.get("test/1").unwrap().unwrap();
        assert_eq!(got.content["title"], "t");
        assert!(store.get("test/2").unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_conflicts_on_taken_id() {
        let store = InMemoryStorage::new();
        store.create(make_object("test/1")).unwrap();
        assert_eq!(
            store.create(make_object("test/1")),
            Err(StoreError::Conflict("test/1".into()))
        );
    }

    #[test]
    fn update_requires_existing() {
        let store = InMemoryStorage::new();
        assert!(matches!(store.update(make_object("test/1")), Err(StoreError::NotFound(_))));
        store.create(make_object("test/1")).unwrap();
        let mut obj = make_object("test/1");
        obj.content = json!({"title": "u"});
        store.update(obj).unwrap();
        assert_eq!(store.get("test/1").unwrap().unwrap().content["title"], "u");
    }

    #[test]
    fn delete_and_get_many() {
        let store = InMemoryStorage::new();
        store.create(make_object("test/1")).unwrap();
        store.create(make_object("test/2")).unwrap();
        store.delete("test/1").unwrap();
        assert!(store.delete("test/1").is_err());
        let found = store
            .get_many(&["test/1".into(), "test/2".into(), "test/3".into()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "test/2");
        assert_eq!(store.list_ids().unwrap(), vec!["test/2".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Payloads
    // -----------------------------------------------------------------------

    #[test]
    fn pending_payloads_become_stored() {
        let store = InMemoryStorage::new();
        let mut obj = make_object("test/1");
        obj.payloads.push(Payload::pending("a", b"hello".to_vec()));
        let stored = store.create(obj).unwrap();
        assert_eq!(stored.payloads[0].source, PayloadSource::Stored);
        assert_eq!(stored.payloads[0].size, 5);
        assert_eq!(store.get_payload("test/1", "a").unwrap().unwrap(), &b"hello"[..]);
    }

    #[test]
    fn update_keeps_replaces_and_drops_payloads() {
        let store = InMemoryStorage::new();
        let mut obj = make_object("test/1");
        obj.payloads.push(Payload::pending("keep", b"k".to_vec()));
        obj.payloads.push(Payload::pending("swap", b"old".to_vec()));
        obj.payloads.push(Payload::pending("drop", b"d".to_vec()));
        let mut stored = store.create(obj).unwrap();

        stored.payloads.retain(|p| p.name != "drop");
        stored.payloads[1] = Payload::pending("swap", b"new!".to_vec());
        store.update(stored).unwrap();

        assert_eq!(store.get_payload("test/1", "keep").unwrap().unwrap(), &b"k"[..]);
        assert_eq!(store.get_payload("test/1", "swap").unwrap().unwrap(), &b"new!"[..]);
        assert!(store.get_payload("test/1", "drop").unwrap().is_none());
    }

    #[test]
    fn stored_reference_without_bytes_is_rejected() {
        let store = InMemoryStorage::new();
        let mut obj = make_object("test/1");
        obj.payloads.push(Payload {
            name: "ghost".into(),
            ..Default::default()
        });
        assert!(matches!(
            store.create(obj),
            Err(StoreError::MissingPayloadBytes { .. })
        ));
    }

    #[test]
    fn payload_ranges() {
        let store = InMemoryStorage::new();
        let mut obj = make_object("test/1");
        obj.payloads.push(Payload::pending("p", b"0123456789".to_vec()));
        store.create(obj).unwrap();
        let slice = store.get_payload_range("test/1", "p", Some(2), Some(4)).unwrap().unwrap();
        assert_eq!(slice, &b"234"[..]);
        assert!(matches!(
            store.get_payload_range("test/1", "p", Some(4), Some(2)),
            Err(StoreError::InvalidRange { .. })
        ));
        assert!(store.get_payload_range("test/1", "nope", None, None).unwrap().is_none());
    }

    #[test]
    fn tampering_changes_bytes() {
        let store = InMemoryStorage::new();
        let mut obj = make_object("test/1");
        obj.payloads.push(Payload::pending("p", b"abc".to_vec()));
        store.create(obj).unwrap();
        assert!(store.tamper_payload("test/1", "p", b"abd".to_vec()));
        assert_eq!(store.get_payload("test/1", "p").unwrap().unwrap(), &b"abd"[..]);
    }
}
