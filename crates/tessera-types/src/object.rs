use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::temporal::Timestamp;

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// Per-object reader/writer lists. `None` means "inherit the default policy".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writers: Option<Vec<String>>,
}

impl AccessControlList {
    pub fn new(readers: Vec<String>, writers: Vec<String>) -> Self {
        Self {
            readers: Some(readers),
            writers: Some(writers),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Where a payload's bytes currently live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PayloadSource {
    /// Fresh bytes supplied by the caller, not yet durable.
    Pending(Bytes),
    /// Bytes already held by the storage backend under the payload's name.
    #[default]
    Stored,
}

/// A named binary attachment.
///
/// Once stored, a payload's bytes are immutable; replacing them means
/// supplying a new pending payload under the same name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(skip)]
    pub source: PayloadSource,
}

impl Payload {
    /// A payload carrying fresh bytes.
    pub fn pending(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            filename: None,
            media_type: None,
            size: data.len() as u64,
            source: PayloadSource::Pending(data),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Fresh bytes, if any.
    pub fn pending_bytes(&self) -> Option<&Bytes> {
        match &self.source {
            PayloadSource::Pending(data) => Some(data),
            PayloadSource::Stored => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.source, PayloadSource::Pending(_))
    }
}

// ---------------------------------------------------------------------------
// Hashes
// ---------------------------------------------------------------------------

/// Digests stamped onto objects whose type is flagged `hashObject`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectHashes {
    pub alg: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payloads: BTreeMap<String, String>,
    pub full: String,
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// System-owned metadata. Callers never set these fields directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_version: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_on: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<ObjectHashes>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub internal_metadata: Map<String, Value>,
}

impl Metadata {
    /// String value of an internal-metadata key.
    pub fn internal_str(&self, key: &str) -> Option<&str> {
        self.internal_metadata.get(key).and_then(Value::as_str)
    }

    pub fn set_internal(&mut self, key: &str, value: impl Into<Value>) {
        self.internal_metadata.insert(key.to_string(), value.into());
    }

    /// Remove an internal-metadata key, returning whether it was present.
    pub fn remove_internal(&mut self, key: &str) -> bool {
        self.internal_metadata.remove(key).is_some()
    }
}

// ---------------------------------------------------------------------------
// DigitalObject
// ---------------------------------------------------------------------------

/// A schema-typed JSON document with attachments and system metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalObject {
    pub id: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<AccessControlList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payloads: Vec<Payload>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DigitalObject {
    pub fn new(id: impl Into<String>, object_type: impl Into<String>, content: Value) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            content,
            ..Default::default()
        }
    }

    pub fn payload(&self, name: &str) -> Option<&Payload> {
        self.payloads.iter().find(|p| p.name == name)
    }

    /// Returns `true` if this is the editable head of its version history.
    pub fn is_tip(&self) -> bool {
        self.metadata.version_of.is_none()
    }

    /// A copy whose payloads are reduced to their stored descriptors.
    pub fn without_pending_bytes(&self) -> Self {
        let mut copy = self.clone();
        for payload in &mut copy.payloads {
            payload.source = PayloadSource::Stored;
        }
        copy
    }
}
