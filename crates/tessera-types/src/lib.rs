//! Foundation types for Tessera.
//!
//! Tessera stores schema-typed JSON documents ("digital objects") with named
//! binary attachments ("payloads"). Every other Tessera crate depends on
//! `tessera-types`.
//!
//! # Key Types
//!
//! - [`DigitalObject`] -- id, type, content, ACL, user metadata, payloads, metadata
//! - [`Payload`] -- a named attachment whose bytes are either pending or stored
//! - [`Metadata`] -- system-owned bookkeeping, including the internal-metadata bag
//! - [`ObjectHashes`] -- digests stamped onto objects whose type requests hashing
//! - [`Timestamp`] -- millisecond UTC instant with the repository's text format

pub mod error;
pub mod handle;
pub mod internal;
pub mod object;
pub mod temporal;

pub use error::TypeError;
pub use handle::{is_valid_handle, validate_handle, DESIGN_OBJECT_ID, SCHEMA_TYPE};
pub use object::{
    AccessControlList, DigitalObject, Metadata, ObjectHashes, Payload, PayloadSource,
};
pub use temporal::Timestamp;
