//! Outside systems the repository notifies but does not depend on.
//!
//! A failure in any of these is logged and alerted; it never undoes a
//! mutation that has already been committed.

use serde_json::Value;
use tessera_types::DigitalObject;
use tracing::error;

use crate::error::RepoResult;

/// Mirrors objects into an external name-resolution service.
pub trait NameResolver: Send + Sync {
    fn register(&self, object: &DigitalObject, values: &[Value]) -> RepoResult<()>;

    fn update(&self, object: &DigitalObject, values: &[Value]) -> RepoResult<()>;

    fn delete(&self, id: &str) -> RepoResult<()>;
}

/// Ends the live sessions of a user.
pub trait SessionInvalidator: Send + Sync {
    fn invalidate_sessions_for(&self, user_id: &str) -> RepoResult<()>;
}

/// Receives "out of sync" alerts for monitored divergence.
pub trait Alerter: Send + Sync {
    fn alert(&self, message: &str);
}

/// Alerts by logging at `error`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlerter;

impl Alerter for TracingAlerter {
    fn alert(&self, message: &str) {
        error!(alert = true, "{message}");
    }
}
