//! Schema validation for Tessera.
//!
//! A type's schema is a JSON-Schema document extended with repository
//! annotations under the `cordra` keyword (the older `repository` keyword
//! is read as a fallback). Validating a document produces both a report of
//! violations and a [`PointerMap`]: every JSON-pointer location in the
//! document whose governing sub-schema carries an annotation.
//!
//! # Modules
//!
//! - [`pointer`] -- RFC 6901 get/set/remove over `serde_json::Value`
//! - [`annotation`] -- the closed set of annotation kinds
//! - [`validator`] -- single-walk validation that builds the pointer map
//! - [`order`] -- reorder object keys to schema declaration order

pub mod annotation;
pub mod error;
pub mod order;
pub mod pointer;
pub mod pointer_map;
pub mod validator;

pub use annotation::{
    annotations_of, extension_property, index_payloads, Annotation, AuthKind, AutoField, Prefixing,
};
pub use error::{SchemaError, SchemaResult};
pub use order::reorder_properties;
pub use pointer_map::{PointerMap, SchemaNode};
pub use validator::{SchemaValidator, ValidationError, ValidationReport};
