//! Field processor pipeline for Tessera.
//!
//! After a document validates against its schema, the pipeline walks the
//! resulting pointer map and applies the schema-declared field semantics:
//! schema-name and username uniqueness, password and secure-property
//! hashing, users lists, auto-generated fields, and canonical property
//! order. Stages run in a fixed order and the first failure aborts the
//! mutation before anything is written.
//!
//! # Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use tessera_gate::{FieldPipeline, NoLookups, PipelineSettings, StageContext};
//! use tessera_schema::SchemaValidator;
//! use tessera_types::{DigitalObject, Timestamp};
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "password": {"type": "string", "cordra": {"auth": "password"}}
//!     }
//! });
//! let mut json = json!({"password": "hunter22"});
//! let report = SchemaValidator::new(schema.clone()).unwrap().validate(&json);
//! let mut object = DigitalObject::new("test/1", "User", json.clone());
//!
//! let settings = PipelineSettings::default();
//! let mut ctx = StageContext {
//!     json: &mut json,
//!     schema: &schema,
//!     pointers: &report.pointers,
//!     object: &mut object,
//!     acting_user: None,
//!     now: Timestamp::now(),
//!     settings: &settings,
//!     lookups: &NoLookups,
//! };
//! FieldPipeline::with_default_stages().run(&mut ctx).unwrap();
//! assert_eq!(json["password"], "");
//! assert!(object.metadata.internal_str("hash").is_some());
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod payloads;
pub mod pipeline;
pub mod references;
pub mod stage;
pub mod stages;

pub use config::PipelineSettings;
pub use error::{GateError, GateResult};
pub use payloads::validate_payloads;
pub use pipeline::{FieldPipeline, PipelineOutcome};
pub use references::check_handle_references;
pub use stage::{FieldLookups, FieldStage, NoLookups, StageContext, StageEffect, StageReport};
