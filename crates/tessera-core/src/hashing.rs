//! Integrity digests for objects whose type sets `hashObject`.
//!
//! Content and user metadata are digested in canonical JSON form. Each
//! payload is digested over its raw bytes. The `full` digest covers the
//! whole object with its metadata reduced to the payload digests, so it
//! changes whenever content, ACL, user metadata, payload descriptors or
//! payload bytes change, and never because of bookkeeping like `txnId`.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tessera_crypto::{digest_json, StreamingDigest, DIGEST_ALGORITHM};
use tessera_store::{Storage, StoreError};
use tessera_types::{DigitalObject, ObjectHashes};

use crate::error::RepoResult;

const CHUNK: usize = 64 * 1024;

/// Stamp `metadata.hashes` onto `object` before it is stored.
///
/// Fresh payload bytes are digested in place and their size recorded.
/// Stored payloads without a recorded digest are read back from `storage`.
/// Digests of payloads the object no longer has are dropped.
pub fn stamp(object: &mut DigitalObject, storage: &dyn Storage) -> RepoResult<()> {
    let mut payload_hashes = object
        .metadata
        .hashes
        .take()
        .map(|h| h.payloads)
        .unwrap_or_default();
    payload_hashes.retain(|name, _| object.payload(name).is_some());

    for payload in &mut object.payloads {
        match payload.pending_bytes() {
            Some(data) => {
                let mut digest = StreamingDigest::new();
                for chunk in data.chunks(CHUNK) {
                    digest.update(chunk);
                }
                let (hash, size) = digest.finish();
                payload.size = size;
                payload_hashes.insert(payload.name.clone(), hash);
            }
            None if !payload_hashes.contains_key(&payload.name) => {
                let hash = stored_payload_digest(storage, &object.id, &payload.name)?;
                payload_hashes.insert(payload.name.clone(), hash);
            }
            None => {}
        }
    }

    let full = full_digest(object, &payload_hashes)?;
    object.metadata.hashes = Some(ObjectHashes {
        alg: DIGEST_ALGORITHM.to_string(),
        content: digest_json(&object.content),
        user_metadata: object.user_metadata.as_ref().map(digest_json),
        payloads: payload_hashes,
        full,
    });
    Ok(())
}

/// Per-field outcome of [`verify`]. `None` means nothing was recorded to
/// compare against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub content: Option<bool>,
    pub user_metadata: Option<bool>,
    pub full: Option<bool>,
    pub payloads: BTreeMap<String, bool>,
}

impl VerificationReport {
    /// Every recorded digest matched.
    pub fn is_intact(&self) -> bool {
        self.content != Some(false)
            && self.user_metadata != Some(false)
            && self.full != Some(false)
            && self.payloads.values().all(|ok| *ok)
    }
}

/// Recompute every digest from current state, re-reading all payload bytes.
pub fn verify(object: &DigitalObject, storage: &dyn Storage) -> RepoResult<VerificationReport> {
    let Some(recorded) = &object.metadata.hashes else {
        return Ok(VerificationReport::default());
    };
    let mut payload_hashes = BTreeMap::new();
    for payload in &object.payloads {
        let hash = stored_payload_digest(storage, &object.id, &payload.name)?;
        payload_hashes.insert(payload.name.clone(), hash);
    }
    let full = full_digest(object, &payload_hashes)?;

    let payloads = payload_hashes
        .iter()
        .map(|(name, hash)| (name.clone(), recorded.payloads.get(name) == Some(hash)))
        .collect();
    let user_metadata = recorded.user_metadata.as_ref().map(|expected| {
        object.user_metadata.as_ref().map(digest_json).as_ref() == Some(expected)
    });
    Ok(VerificationReport {
        content: Some(digest_json(&object.content) == recorded.content),
        user_metadata,
        full: Some(full == recorded.full),
        payloads,
    })
}

fn stored_payload_digest(storage: &dyn Storage, id: &str, name: &str) -> RepoResult<String> {
    let data = storage
        .get_payload(id, name)?
        .ok_or_else(|| StoreError::MissingPayloadBytes {
            id: id.to_string(),
            payload: name.to_string(),
        })?;
    let mut digest = StreamingDigest::new();
    for chunk in data.chunks(CHUNK) {
        digest.update(chunk);
    }
    Ok(digest.finish().0)
}

fn full_digest(object: &DigitalObject, payload_hashes: &BTreeMap<String, String>) -> RepoResult<String> {
    let mut value = serde_json::to_value(object)?;
    let metadata = if payload_hashes.is_empty() {
        json!({})
    } else {
        json!({"hashes": {"payloads": payload_hashes}})
    };
    if let Value::Object(map) = &mut value {
        map.insert("metadata".into(), metadata);
    }
    Ok(digest_json(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::InMemoryStorage;
    use tessera_types::Payload;

    fn object_with_payloads() -> DigitalObject {
        let mut obj = DigitalObject::new("test/1", "Doc", json!({"b": 2, "a": [1, 2]}));
        obj.user_metadata = Some(json!({"tag": "x"}));
        obj.payloads.push(Payload::pending("one", b"first payload".to_vec()));
        obj.payloads.push(Payload::pending("two", b"second".to_vec()));
        obj
    }

    fn stamped_and_stored(storage: &InMemoryStorage) -> DigitalObject {
        let mut obj = object_with_payloads();
        stamp(&mut obj, storage).unwrap();
        storage.create(obj).unwrap()
    }

    // -----------------------------------------------------------------------
    // stamp
    // -----------------------------------------------------------------------

    #[test]
    fn stamp_records_every_digest() {
        let storage = InMemoryStorage::new();
        let mut obj = object_with_payloads();
        stamp(&mut obj, &storage).unwrap();
        let hashes = obj.metadata.hashes.as_ref().unwrap();
        assert_eq!(hashes.alg, "SHA-256");
        assert_eq!(hashes.content, digest_json(&json!({"a": [1, 2], "b": 2})));
        assert!(hashes.user_metadata.is_some());
        assert_eq!(hashes.payloads.len(), 2);
        assert_eq!(obj.payloads[0].size, 13);
        assert_eq!(hashes.full.len(), 64);
    }

    #[test]
    fn restamp_reads_stored_payloads_and_drops_removed_ones() {
        let storage = InMemoryStorage::new();
        let stored = stamped_and_stored(&storage);
        let original = stored.metadata.hashes.clone().unwrap();

        let mut next = stored.clone();
        next.metadata.hashes.as_mut().unwrap().payloads.remove("one");
        next.payloads.retain(|p| p.name != "two");
        stamp(&mut next, &storage).unwrap();
        let hashes = next.metadata.hashes.unwrap();
        assert_eq!(hashes.payloads.get("one"), original.payloads.get("one"));
        assert!(!hashes.payloads.contains_key("two"));
        assert_ne!(hashes.full, original.full);
    }

    #[test]
    fn full_digest_ignores_bookkeeping() {
        let storage = InMemoryStorage::new();
        let mut a = object_with_payloads();
        let mut b = object_with_payloads();
        b.metadata.txn_id = Some(42);
        b.metadata.modified_by = Some("someone".into());
        stamp(&mut a, &storage).unwrap();
        stamp(&mut b, &storage).unwrap();
        assert_eq!(a.metadata.hashes.unwrap().full, b.metadata.hashes.unwrap().full);
    }

    // -----------------------------------------------------------------------
    // verify
    // -----------------------------------------------------------------------

    #[test]
    fn unmodified_object_verifies() {
        let storage = InMemoryStorage::new();
        let stored = stamped_and_stored(&storage);
        let report = verify(&stored, &storage).unwrap();
        assert_eq!(report.content, Some(true));
        assert_eq!(report.user_metadata, Some(true));
        assert_eq!(report.full, Some(true));
        assert_eq!(report.payloads.len(), 2);
        assert!(report.is_intact());
    }

    #[test]
    fn tampered_payload_is_the_only_payload_mismatch() {
        let storage = InMemoryStorage::new();
        let stored = stamped_and_stored(&storage);
        assert!(storage.tamper_payload("test/1", "two", b"SECOND".to_vec()));
        let report = verify(&stored, &storage).unwrap();
        assert_eq!(report.payloads["one"], true);
        assert_eq!(report.payloads["two"], false);
        assert_eq!(report.content, Some(true));
        assert_eq!(report.full, Some(false));
        assert!(!report.is_intact());
    }

    #[test]
    fn unhashed_object_has_nothing_to_verify() {
        let storage = InMemoryStorage::new();
        let obj = storage.create(DigitalObject::new("test/2", "Doc", json!({}))).unwrap();
        assert_eq!(verify(&obj, &storage).unwrap(), VerificationReport::default());
    }
}
