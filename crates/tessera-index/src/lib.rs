//! Search index for Tessera.
//!
//! The index is a derived view of storage: the repository writes every
//! mutation to it after the storage write and re-derives entries from
//! storage during recovery. This crate defines the [`Indexer`] contract, a
//! small structured [`Query`] language, and an in-memory backend.
//!
//! # Key Types
//!
//! - [`Indexer`] -- index/delete/search contract
//! - [`Query`] -- term, boolean, and negation queries over indexed fields
//! - [`IndexDocument`] -- the flattened field view of one object
//! - [`InMemoryIndex`] -- `RwLock<BTreeMap>` backend for tests and embedding

pub mod document;
pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use document::{fields, IndexDocument, PayloadIndexState};
pub use error::{IndexError, IndexResult};
pub use memory::InMemoryIndex;
pub use query::Query;
pub use traits::Indexer;
