use std::time::Instant;

use tracing::debug;

use crate::error::GateResult;
use crate::stage::{FieldStage, StageContext, StageEffect, StageReport};
use crate::stages::{
    AutoFieldStage, PasswordStage, PropertyOrderStage, SchemaNameStage, SecurePropertyStage,
    UsernameStage, UsersListStage,
};

// ---------------------------------------------------------------------------
// PipelineOutcome
// ---------------------------------------------------------------------------

/// Combined result of a full pipeline run.
#[derive(Clone, Debug, Default)]
pub struct PipelineOutcome {
    /// Some stage rewrote the working JSON.
    pub changed_json: bool,
    /// The recorded username or users list changed; auth caches are stale.
    pub changed_auth: bool,
    /// Per-stage results in evaluation order.
    pub stage_results: Vec<StageReport>,
}

// ---------------------------------------------------------------------------
// FieldPipeline
// ---------------------------------------------------------------------------

/// An ordered list of field stages, run fail-fast.
pub struct FieldPipeline {
    stages: Vec<Box<dyn FieldStage>>,
}

impl FieldPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// The standard pipeline:
    /// schema name -> username -> password -> users list -> secure
    /// properties -> auto-generated fields -> property order
    pub fn with_default_stages() -> Self {
        let mut pipeline = Self::new();
        pipeline.add_stage(Box::new(SchemaNameStage));
        pipeline.add_stage(Box::new(UsernameStage));
        pipeline.add_stage(Box::new(PasswordStage));
        pipeline.add_stage(Box::new(UsersListStage));
        pipeline.add_stage(Box::new(SecurePropertyStage));
        pipeline.add_stage(Box::new(AutoFieldStage));
        pipeline.add_stage(Box::new(PropertyOrderStage));
        pipeline
    }

    pub fn add_stage(&mut self, stage: Box<dyn FieldStage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage in order. The first error aborts the run.
    pub fn run(&self, ctx: &mut StageContext<'_>) -> GateResult<PipelineOutcome> {
        let mut outcome = PipelineOutcome {
            stage_results: Vec::with_capacity(self.stages.len()),
            ..Default::default()
        };
        for stage in &self.stages {
            let started = Instant::now();
            let effect: StageEffect = stage.apply(ctx)?;
            let elapsed = started.elapsed();
            debug!(
                stage = stage.name(),
                object_id = %ctx.object.id,
                changed_json = effect.changed_json,
                changed_auth = effect.changed_auth,
                "field stage applied"
            );
            outcome.changed_json |= effect.changed_json;
            outcome.changed_auth |= effect.changed_auth;
            outcome.stage_results.push(StageReport {
                stage_name: stage.name().to_string(),
                effect,
                elapsed,
            });
        }
        Ok(outcome)
    }
}

impl Default for FieldPipeline {
    fn default() -> Self {
        Self::with_default_stages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineSettings;
    use crate::error::GateError;
    use crate::stage::{FieldLookups, NoLookups};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tessera_schema::SchemaValidator;
    use tessera_types::{internal, DigitalObject, Timestamp};

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "cordra": {"type": {"autoGeneratedField": "handle"}}},
                "username": {"type": "string", "cordra": {"auth": "username"}},
                "password": {"type": "string", "cordra": {"auth": "password"}},
                "apiKey": {"type": "string", "cordra": {"secureProperty": true}}
            }
        })
    }

    struct Holders(Vec<String>);

    impl FieldLookups for Holders {
        fn username_holders(&self, _username: &str) -> GateResult<Vec<String>> {
            Ok(self.0.clone())
        }
        fn schema_id_for_name(&self, _name: &str) -> GateResult<Option<String>> {
            Ok(None)
        }
        fn object_types(&self, _ids: &[String]) -> GateResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
    }

    fn run(
        schema: &Value,
        json: &mut Value,
        object: &mut DigitalObject,
        lookups: &dyn FieldLookups,
    ) -> GateResult<PipelineOutcome> {
        let report = SchemaValidator::new(schema.clone()).unwrap().validate(json);
        assert!(report.is_valid(), "{:?}", report.errors);
        let settings = PipelineSettings::default();
        let mut ctx = StageContext {
            json,
            schema,
            pointers: &report.pointers,
            object,
            acting_user: Some("admin"),
            now: Timestamp::from_millis(1_700_000_000_123),
            settings: &settings,
            lookups,
        };
        FieldPipeline::with_default_stages().run(&mut ctx)
    }

    // -----------------------------------------------------------------------
    // Full pipeline
    // -----------------------------------------------------------------------

    #[test]
    fn default_pipeline_has_seven_stages() {
        assert_eq!(FieldPipeline::with_default_stages().stage_count(), 7);
    }

    #[test]
    fn user_object_is_transformed() {
        let schema = user_schema();
        let mut json = json!({"apiKey": "k-1", "password": "secret123", "username": "alice", "id": ""});
        let mut object = DigitalObject::new("test/alice", "User", Value::Null);

        let outcome = run(&schema, &mut json, &mut object, &NoLookups).unwrap();

        assert!(outcome.changed_json);
        assert!(outcome.changed_auth);
        assert_eq!(json["password"], "");
        assert_eq!(json["apiKey"], "");
        assert_eq!(json["id"], "test/alice");
        let md = &object.metadata;
        assert_eq!(md.internal_str(internal::USERNAME), Some("alice"));
        assert!(md.internal_str(internal::HASH).is_some());
        assert!(md.internal_str(internal::SALT).is_some());
        assert!(md.internal_metadata[internal::SECURE_PROPERTIES]["/apiKey"]["hash"].is_string());
        // Declaration order restored.
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["id", "username", "password", "apiKey"]);
        assert_eq!(outcome.stage_results.len(), 7);
    }

    #[test]
    fn duplicate_username_fails_at_pointer() {
        let schema = user_schema();
        let mut json = json!({"username": "alice", "password": "pw"});
        let mut object = DigitalObject::new("test/two", "User", Value::Null);
        let err = run(&schema, &mut json, &mut object, &Holders(vec!["test/one".into()])).unwrap_err();
        match err {
            GateError::Invalid { pointer, message } => {
                assert_eq!(pointer.as_deref(), Some("/username"));
                assert_eq!(message, "Username alice is not unique.");
            }
            other => panic!("unexpected {other:?}"),
        }
        // Nothing was hashed.
        assert_eq!(json["password"], "pw");
    }

    #[test]
    fn rerun_is_idempotent() {
        let schema = user_schema();
        let mut json = json!({"username": "bob", "password": "pw", "apiKey": "k"});
        let mut object = DigitalObject::new("test/bob", "User", Value::Null);
        run(&schema, &mut json, &mut object, &NoLookups).unwrap();
        let hash = object.metadata.internal_str(internal::HASH).map(str::to_string);
        let secure = object.metadata.internal_metadata[internal::SECURE_PROPERTIES].clone();

        let again = run(&schema, &mut json, &mut object, &Holders(vec!["test/bob".into()])).unwrap();
        assert!(!again.changed_auth);
        assert_eq!(object.metadata.internal_str(internal::HASH).map(str::to_string), hash);
        assert_eq!(object.metadata.internal_metadata[internal::SECURE_PROPERTIES], secure);
    }
}
