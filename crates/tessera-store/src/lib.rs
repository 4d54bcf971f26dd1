//! Object storage for Tessera.
//!
//! The repository core treats storage as an external collaborator. This
//! crate defines the contract ([`Storage`]) and an in-memory backend used
//! for tests and embedding.
//!
//! # Contract
//!
//! 1. `create` fails with [`StoreError::Conflict`] if the id is taken.
//! 2. Payloads with pending bytes are made durable by `create`/`update`;
//!    payloads absent from the updated object are dropped.
//! 3. Stored payload bytes are immutable. Replacing a payload stores new
//!    bytes under the same name.
//! 4. Returned objects never carry pending bytes.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStorage;
pub use traits::Storage;
