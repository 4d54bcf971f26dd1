//! Wire format for cross-cluster replication.
//!
//! Every committed create, update and delete that originated locally is
//! published as one JSON message keyed by the object id. Consumers apply
//! them through [`Repository::apply_replication_message`].
//!
//! [`Repository::apply_replication_message`]: crate::Repository::apply_replication_message

use std::collections::BTreeMap;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tessera_store::Storage;
use tessera_types::{DigitalObject, PayloadSource};

use crate::error::{RepoError, RepoResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationKind {
    Update,
    Delete,
}

/// The object of an UPDATE message, optionally with payload bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedObject {
    pub object: DigitalObject,
    /// Payload name to base64 bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payloads: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationMessage {
    /// Cluster the change originated in.
    pub cluster_id: String,
    #[serde(rename = "type")]
    pub kind: ReplicationKind,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ReplicatedObject>,
}

impl ReplicationMessage {
    pub fn delete(cluster_id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            kind: ReplicationKind::Delete,
            handle: handle.into(),
            object: None,
        }
    }

    /// An UPDATE for a stored object. With `include_payloads` every payload
    /// is read back from `storage` and carried inline.
    pub fn update(
        cluster_id: impl Into<String>,
        object: &DigitalObject,
        include_payloads: bool,
        storage: &dyn Storage,
    ) -> RepoResult<Self> {
        let payloads = if include_payloads && !object.payloads.is_empty() {
            let mut encoded = BTreeMap::new();
            for payload in &object.payloads {
                if let Some(data) = storage.get_payload(&object.id, &payload.name)? {
                    encoded.insert(payload.name.clone(), STANDARD.encode(&data));
                }
            }
            Some(encoded)
        } else {
            None
        };
        Ok(Self {
            cluster_id: cluster_id.into(),
            kind: ReplicationKind::Update,
            handle: object.id.clone(),
            object: Some(ReplicatedObject {
                object: object.without_pending_bytes(),
                payloads,
            }),
        })
    }

    pub fn to_json(&self) -> RepoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> RepoResult<Self> {
        serde_json::from_str(text).map_err(|e| RepoError::BadRequest(format!("Malformed replication message: {e}")))
    }
}

impl ReplicatedObject {
    /// The carried object with inline payload bytes attached as pending
    /// data. Payloads without inline bytes are left as stored references.
    pub fn into_object(self) -> RepoResult<DigitalObject> {
        let mut object = self.object;
        let Some(mut encoded) = self.payloads else {
            return Ok(object);
        };
        for payload in &mut object.payloads {
            if let Some(text) = encoded.remove(&payload.name) {
                let data = STANDARD
                    .decode(text)
                    .map_err(|e| RepoError::BadRequest(format!("Bad payload encoding for {}: {e}", payload.name)))?;
                payload.source = PayloadSource::Pending(Bytes::from(data));
            }
        }
        Ok(object)
    }
}

/// Publishes replication messages to the outside.
pub trait ReplicationProducer: Send + Sync {
    fn send(&self, key: &str, message: &str) -> RepoResult<()>;
}

/// Collects sent messages in memory.
#[derive(Debug, Default)]
pub struct InMemoryReplicationBus {
    sent: Mutex<Vec<(String, String)>>,
}

impl InMemoryReplicationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sent `(key, message)` pairs, oldest first.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    pub fn drain(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.sent.lock().expect("lock poisoned"))
    }
}

impl ReplicationProducer for InMemoryReplicationBus {
    fn send(&self, key: &str, message: &str) -> RepoResult<()> {
        self.sent
            .lock()
            .expect("lock poisoned")
            .push((key.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_store::InMemoryStorage;
    use tessera_types::Payload;

    #[test]
    fn delete_message_wire_shape() {
        let msg = ReplicationMessage::delete("east", "test/1");
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"clusterId": "east", "type": "DELETE", "handle": "test/1"}));
    }

    #[test]
    fn update_carries_payload_bytes_only_on_request() {
        let storage = InMemoryStorage::new();
        let mut obj = DigitalObject::new("test/1", "Doc", json!({"a": 1}));
        obj.payloads.push(Payload::pending("p", b"hello".to_vec()));
        let stored = storage.create(obj).unwrap();

        let bare = ReplicationMessage::update("east", &stored, false, &storage).unwrap();
        assert!(bare.object.as_ref().unwrap().payloads.is_none());

        let full = ReplicationMessage::update("east", &stored, true, &storage).unwrap();
        let text = full.to_json().unwrap();
        assert!(text.contains("\"type\":\"UPDATE\""));
        let parsed = ReplicationMessage::from_json(&text).unwrap();
        assert_eq!(parsed.handle, "test/1");
        let object = parsed.object.unwrap().into_object().unwrap();
        assert_eq!(object.payloads[0].pending_bytes().map(|b| b.as_ref()), Some(&b"hello"[..]));
    }

    #[test]
    fn malformed_message_is_a_bad_request() {
        assert!(matches!(
            ReplicationMessage::from_json("{\"type\": \"MOVE\"}"),
            Err(RepoError::BadRequest(_))
        ));
    }

    #[test]
    fn bus_records_and_drains() {
        let bus = InMemoryReplicationBus::new();
        bus.send("test/1", "{}").unwrap();
        assert_eq!(bus.messages().len(), 1);
        assert_eq!(bus.drain(), vec![("test/1".to_string(), "{}".to_string())]);
        assert!(bus.messages().is_empty());
    }
}
