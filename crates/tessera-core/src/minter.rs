use std::sync::atomic::{AtomicU32, Ordering};

use tessera_crypto::handle_digest;
use tessera_types::Timestamp;

/// Mints `prefix/suffix` handles.
///
/// Suffixes are the first ten bytes of SHA-1 in hex, either over caller
/// data or over the current time plus a rolling three-digit counter.
#[derive(Debug, Default)]
pub struct HandleMinter {
    counter: AtomicU32,
}

impl HandleMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic handle for `data`.
    pub fn mint(&self, prefix: &str, data: &str) -> String {
        format!("{}/{}", trim(prefix), handle_digest(data.as_bytes()))
    }

    /// A fresh handle derived from the clock.
    pub fn mint_by_timestamp(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) % 1000;
        let data = format!("{}{n:03}", Timestamp::now().as_millis());
        self.mint(prefix, &data)
    }

    pub fn mint_with_suffix(&self, prefix: &str, suffix: &str) -> String {
        format!("{}/{suffix}", trim(prefix))
    }
}

fn trim(prefix: &str) -> &str {
    prefix.strip_suffix('/').unwrap_or(prefix)
}
