//! Coordination primitives for Tessera.
//!
//! Everything here blocks the calling OS thread; there is no async runtime
//! requirement. Lock acquisition never times out: a wedged holder stalls
//! every caller waiting on the same key.
//!
//! Lock order used by the repository is fixed: object id, then schema name,
//! then username, then the design write lock. Guards release in reverse.

pub mod cancel;
pub mod cluster;
pub mod design_lock;
pub mod error;
pub mod lock;
pub mod pool;
pub mod throttle;

pub use cancel::CancelFlag;
pub use cluster::{ClusterCoordinator, LocalCluster, MembershipChange, Signal, SignalMessage};
pub use design_lock::{DesignLocker, DesignReadGuard, DesignWriteGuard, MemoryDesignLocker};
pub use error::{SyncError, SyncResult};
pub use lock::{MemoryNameLocker, NameGuard, NameLocker};
pub use pool::WorkerPool;
pub use throttle::Throttle;
