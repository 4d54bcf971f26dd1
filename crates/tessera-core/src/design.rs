//! The cached design: configuration plus the compiled schema registry.
//!
//! Request paths read an immutable [`DesignSnapshot`]. A change builds a
//! whole new snapshot and swaps it in under the design write lock, so a
//! reader either sees the old registry or the new one, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tessera_schema::{index_payloads, SchemaValidator};
use tessera_types::{DigitalObject, SCHEMA_TYPE};
use tracing::warn;

use crate::config::Design;
use crate::error::{RepoError, RepoResult};

/// Type of the singleton design object.
pub const DESIGN_TYPE: &str = "CordraDesign";

/// One compiled schema.
#[derive(Clone, Debug)]
pub struct SchemaEntry {
    /// Id of the defining Schema object; `None` for built-ins.
    pub id: Option<String>,
    pub name: String,
    pub validator: SchemaValidator,
    /// Objects of this type get `metadata.hashes` stamped on every write.
    pub hash_object: bool,
    pub index_payloads: bool,
}

impl SchemaEntry {
    fn new(id: Option<String>, name: String, schema: Value, hash_object: bool) -> RepoResult<Self> {
        let index_payloads = index_payloads(&schema);
        let validator = SchemaValidator::new(schema)?;
        Ok(Self {
            id,
            name,
            validator,
            hash_object,
            index_payloads,
        })
    }

    /// Compile a Schema object: `{"name": .., "schema": {..}, "hashObject"?: bool}`.
    pub fn from_object(object: &DigitalObject) -> RepoResult<Self> {
        let content = &object.content;
        let name = content
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RepoError::invalid_at("/name", "Schema object has no name"))?;
        let schema = content
            .get("schema")
            .cloned()
            .ok_or_else(|| RepoError::invalid_at("/schema", "Schema object has no schema"))?;
        let hash_object = content
            .get("hashObject")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self::new(Some(object.id.clone()), name.to_string(), schema, hash_object)
    }

    /// The meta-schema every Schema object is validated against.
    pub fn meta_schema() -> RepoResult<Self> {
        let schema = json!({
            "type": "object",
            "required": ["name", "schema"],
            "properties": {
                "identifier": {
                    "type": "string",
                    "cordra": {"type": {"autoGeneratedField": "handle"}}
                },
                "name": {"type": "string", "minLength": 1},
                "schema": {"type": "object"},
                "javascript": {"type": "string"},
                "hashObject": {"type": "boolean"}
            }
        });
        Self::new(None, SCHEMA_TYPE.to_string(), schema, false)
    }
}

/// An immutable view of the design and every known schema.
#[derive(Clone, Debug)]
pub struct DesignSnapshot {
    pub version: u64,
    pub design: Design,
    schemas: BTreeMap<String, Arc<SchemaEntry>>,
}

impl DesignSnapshot {
    /// Snapshot with only the built-in meta-schema.
    pub fn bootstrap() -> RepoResult<Self> {
        let mut schemas = BTreeMap::new();
        schemas.insert(SCHEMA_TYPE.to_string(), Arc::new(SchemaEntry::meta_schema()?));
        Ok(Self {
            version: 0,
            design: Design::default(),
            schemas,
        })
    }

    /// Build from the design and the Schema objects it lists.
    ///
    /// A Schema object that fails to compile is skipped with a warning, so
    /// one bad schema cannot take the whole registry down.
    pub fn build(version: u64, design: Design, schema_objects: &[DigitalObject]) -> RepoResult<Self> {
        let mut snapshot = Self {
            version,
            design,
            ..Self::bootstrap()?
        };
        for object in schema_objects {
            match SchemaEntry::from_object(object) {
                Ok(entry) => snapshot.insert(entry),
                Err(e) => warn!(object_id = %object.id, error = %e, "skipping unusable schema"),
            }
        }
        Ok(snapshot)
    }

    fn insert(&mut self, entry: SchemaEntry) {
        if entry.name == SCHEMA_TYPE {
            return;
        }
        self.schemas.insert(entry.name.clone(), Arc::new(entry));
    }

    /// A copy with `entry` registered, replacing any schema of the same id.
    pub fn with_schema(&self, entry: SchemaEntry) -> Self {
        let mut next = self.clone();
        next.version += 1;
        if let Some(id) = &entry.id {
            next.schemas.retain(|_, e| e.id.as_ref() != Some(id));
            next.design.schema_ids.insert(id.clone(), entry.name.clone());
        }
        next.insert(entry);
        next
    }

    /// A copy without the schema defined by object `id`.
    pub fn without_schema(&self, id: &str) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.schemas.retain(|_, e| e.id.as_deref() != Some(id));
        next.design.schema_ids.remove(id);
        next
    }

    /// A copy with a different design, keeping the compiled schemas.
    pub fn with_design(&self, design: Design) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.design = design;
        next
    }

    pub fn schema(&self, type_name: &str) -> Option<&SchemaEntry> {
        self.schemas.get(type_name).map(Arc::as_ref)
    }

    /// Id of the Schema object currently holding `name`.
    pub fn schema_id_for_name(&self, name: &str) -> Option<&str> {
        self.schemas.get(name).and_then(|e| e.id.as_deref())
    }

    pub fn minting_prefix(&self) -> &str {
        self.design.minting_prefix()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct DesignCache {
    current: RwLock<Arc<DesignSnapshot>>,
}

impl DesignCache {
    pub fn new(snapshot: DesignSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn load(&self) -> Arc<DesignSnapshot> {
        Arc::clone(&self.current.read().expect("lock poisoned"))
    }

    /// Replace the snapshot. Callers hold the design write lock.
    pub fn swap(&self, next: DesignSnapshot) {
        *self.current.write().expect("lock poisoned") = Arc::new(next);
    }
}
