//! Transactional object repository for Tessera.
//!
//! Objects are typed JSON documents validated against Schema objects that
//! live in the same repository. Every mutation runs under the object's
//! name lock, through the field pipeline, and inside a ledger transaction
//! covering the storage, index and replication writes. Work a crashed
//! member left open is replayed from storage by the recovery pass.
//!
//! # Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use tessera_core::{ObjectDelta, Repository, WriteOptions};
//! use tessera_types::SCHEMA_TYPE;
//!
//! let repo = Repository::in_memory().unwrap();
//! repo.create(
//!     ObjectDelta::create(SCHEMA_TYPE, json!({"name": "Note", "schema": {"type": "object"}})),
//!     &WriteOptions::anonymous(),
//! )
//! .unwrap();
//!
//! let note = repo
//!     .create(ObjectDelta::create("Note", json!({"text": "hi"})), &WriteOptions::anonymous())
//!     .unwrap();
//! assert_eq!(repo.get_object(&note.id, None).unwrap().content["text"], "hi");
//! ```

pub mod auth_cache;
pub mod config;
pub mod design;
pub mod error;
pub mod external;
pub mod hashing;
pub mod hooks;
pub mod minter;
pub mod replication;
pub mod repository;
pub mod telemetry;

pub use config::{ConfigError, Design, HandleMinting, RepositoryConfig};
pub use design::{DesignSnapshot, SchemaEntry, DESIGN_TYPE};
pub use error::{RepoError, RepoResult};
pub use external::{Alerter, NameResolver, SessionInvalidator, TracingAlerter};
pub use hashing::VerificationReport;
pub use hooks::{GeneratedId, HookContext, LifecycleHooks, NoOpHooks, ObjectDelta};
pub use minter::HandleMinter;
pub use replication::{InMemoryReplicationBus, ReplicationKind, ReplicationMessage, ReplicationProducer};
pub use repository::{
    BackgroundTasks, RecoveryReport, Repository, RepositoryBuilder, WriteOptions, ADMIN_USERNAME,
};

// Re-export key types
pub use tessera_types::{DigitalObject, Payload, DESIGN_OBJECT_ID, SCHEMA_TYPE};
