//! Transaction ledger for Tessera.
//!
//! Every mutation brackets its storage + index + replication span with a
//! transaction record: opened immediately before, closed immediately after.
//! A record left open means the owning cluster member crashed mid-span;
//! recovery re-derives index and replication state for the object from
//! storage and closes the record, or hands it to the reprocessing queue.
//!
//! # Backends
//!
//! - [`InMemoryLedger`] / [`InMemoryReprocessingQueue`] -- single-process, volatile
//! - [`FileLedger`] / [`FileReprocessingQueue`] -- CRC-framed append logs that
//!   survive process restarts
//! - [`FallbackQueue`] -- remembers inserts the durable queue rejected

pub mod error;
pub mod file;
pub mod memory;
pub mod queue;
pub mod record;
pub mod traits;
pub mod wal;

pub use error::{LedgerError, LedgerResult};
pub use file::FileLedger;
pub use memory::InMemoryLedger;
pub use queue::{
    FallbackQueue, FileReprocessingQueue, InMemoryReprocessingQueue, QueuedTransaction,
    ReprocessingQueue,
};
pub use record::{TransactionRecord, TxnIdGenerator, TxnOperation};
pub use traits::TransactionLedger;
