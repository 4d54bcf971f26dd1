use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tessera_schema::PointerMap;
use tessera_types::{DigitalObject, Timestamp};

use crate::config::PipelineSettings;
use crate::error::GateResult;

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Read-only queries some stages need against the rest of the repository.
pub trait FieldLookups: Send + Sync {
    /// Ids of objects whose recorded username equals `username`, ignoring
    /// case. Must observe all completed writes.
    fn username_holders(&self, username: &str) -> GateResult<Vec<String>>;

    /// Id of the schema object currently registered under `name`.
    fn schema_id_for_name(&self, name: &str) -> GateResult<Option<String>>;

    /// Types of the given objects, in one batch. Missing ids are absent
    /// from the result.
    fn object_types(&self, ids: &[String]) -> GateResult<HashMap<String, String>>;
}

/// Lookups for a repository with no other objects.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLookups;

impl FieldLookups for NoLookups {
    fn username_holders(&self, _username: &str) -> GateResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn schema_id_for_name(&self, _name: &str) -> GateResult<Option<String>> {
        Ok(None)
    }

    fn object_types(&self, _ids: &[String]) -> GateResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// Everything a stage may read or rewrite.
///
/// `json` is the working copy of the content; `object` carries id, type and
/// metadata and is where derived state (`internalMetadata`) lands.
pub struct StageContext<'a> {
    pub json: &'a mut Value,
    pub schema: &'a Value,
    pub pointers: &'a PointerMap,
    pub object: &'a mut DigitalObject,
    pub acting_user: Option<&'a str>,
    pub now: Timestamp,
    pub settings: &'a PipelineSettings,
    pub lookups: &'a dyn FieldLookups,
}

// ---------------------------------------------------------------------------
// StageEffect / StageReport
// ---------------------------------------------------------------------------

/// What a stage changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageEffect {
    /// The working JSON was rewritten.
    pub changed_json: bool,
    /// The recorded username or users list changed.
    pub changed_auth: bool,
}

impl StageEffect {
    pub const NONE: Self = Self {
        changed_json: false,
        changed_auth: false,
    };

    pub fn json(changed: bool) -> Self {
        Self {
            changed_json: changed,
            changed_auth: false,
        }
    }

    pub fn auth(changed: bool) -> Self {
        Self {
            changed_json: false,
            changed_auth: changed,
        }
    }
}

/// Recorded result of one completed stage.
#[derive(Clone, Debug)]
pub struct StageReport {
    pub stage_name: String,
    pub effect: StageEffect,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// FieldStage trait
// ---------------------------------------------------------------------------

/// One step of the field pipeline.
///
/// Stages must be idempotent: running a stage twice on its own output
/// changes nothing further.
pub trait FieldStage: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, ctx: &mut StageContext<'_>) -> GateResult<StageEffect>;
}
