use std::collections::BTreeMap;

use serde_json::Value;
use tessera_schema::{pointer, Annotation, PointerMap};
use tessera_types::{internal, DigitalObject};

/// Names of the system fields every document carries.
pub mod fields {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const VERSION_OF: &str = "versionOf";
    pub const IS_VERSION: &str = "isVersion";
    pub const CREATED_BY: &str = "createdBy";
    pub const MODIFIED_BY: &str = "modifiedBy";
    pub const TXN_ID: &str = "txnId";
    pub const USERNAME: &str = "username";
    pub const USERS: &str = "users";
    pub const SCHEMA_NAME: &str = "schemaName";
    pub const PAYLOAD: &str = "payload";
    pub const PAYLOAD_INDEX_STATE: &str = "payloadIndexState";
    pub const PAYLOAD_INDEX_MEMBER: &str = "payloadIndexMember";
    pub const REFERENCES: &str = "references";
}

/// Progress of the (possibly slow) payload-text part of an index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadIndexState {
    InProcess,
    Complete,
}

impl PayloadIndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProcess => "indexInProcess",
            Self::Complete => "indexComplete",
        }
    }
}

/// Flattened, searchable view of one object plus the object itself.
#[derive(Clone, Debug)]
pub struct IndexDocument {
    pub object: DigitalObject,
    fields: BTreeMap<String, Vec<String>>,
}

impl IndexDocument {
    /// Flatten `object` into system fields and one field per content leaf.
    pub fn build(object: &DigitalObject) -> Self {
        let mut doc = Self {
            object: object.without_pending_bytes(),
            fields: BTreeMap::new(),
        };
        let md = &object.metadata;
        doc.add(fields::ID, &object.id);
        doc.add(fields::TYPE, &object.object_type);
        doc.add(fields::IS_VERSION, if md.is_version { "true" } else { "false" });
        if let Some(v) = &md.version_of {
            doc.add(fields::VERSION_OF, v);
        }
        if let Some(v) = &md.created_by {
            doc.add(fields::CREATED_BY, v);
        }
        if let Some(v) = &md.modified_by {
            doc.add(fields::MODIFIED_BY, v);
        }
        if let Some(v) = md.txn_id {
            doc.add(fields::TXN_ID, &v.to_string());
        }
        if let Some(v) = md.internal_str(internal::USERNAME) {
            doc.add(fields::USERNAME, v);
        }
        if let Some(v) = md.internal_str(internal::SCHEMA_NAME) {
            doc.add(fields::SCHEMA_NAME, v);
        }
        if let Some(users) = md.internal_str(internal::USERS) {
            for member in users.lines().filter(|l| !l.is_empty()) {
                doc.add(fields::USERS, member);
            }
        }
        for key in [fields::PAYLOAD_INDEX_STATE, fields::PAYLOAD_INDEX_MEMBER] {
            if let Some(v) = md.internal_str(key) {
                doc.add(key, v);
            }
        }
        for payload in &object.payloads {
            doc.add(fields::PAYLOAD, &payload.name);
        }
        doc.add_leaves(&object.content, "");
        doc
    }

    fn add(&mut self, field: &str, value: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn set(&mut self, field: &str, value: &str) {
        self.fields.insert(field.to_string(), vec![value.to_string()]);
    }

    fn add_leaves(&mut self, value: &Value, ptr: &str) {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    self.add_leaves(v, &pointer::child(ptr, k));
                }
            }
            Value::Array(items) => {
                for (i, v) in items.iter().enumerate() {
                    self.add_leaves(v, &pointer::index_child(ptr, i));
                }
            }
            Value::String(s) => self.add(field_name(ptr), s),
            other => self.add(field_name(ptr), &other.to_string()),
        }
    }

    /// Record the payload-indexing state and owning member.
    pub fn mark_payloads(&mut self, state: PayloadIndexState, member_id: &str) {
        self.set(fields::PAYLOAD_INDEX_STATE, state.as_str());
        self.set(fields::PAYLOAD_INDEX_MEMBER, member_id);
    }

    /// Record the raw value at each handle-reference location.
    pub fn add_references(&mut self, pointers: &PointerMap) {
        for (ptr, _) in pointers.find(|a| matches!(a, Annotation::HandleReference { .. })) {
            if let Some(value) = pointer::get_str(&self.object.content, ptr).map(str::to_string) {
                self.add(fields::REFERENCES, &value);
            }
        }
    }

    /// Add the text of one payload under `payload/<name>`.
    pub fn add_payload_text(&mut self, name: &str, text: &str) {
        self.add(&format!("{}/{name}", fields::PAYLOAD), text);
    }

    /// All values of a field (empty if absent).
    pub fn values(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn id(&self) -> &str {
        &self.object.id
    }
}

fn field_name(ptr: &str) -> &str {
    if ptr.is_empty() {
        "/"
    } else {
        ptr
    }
}
