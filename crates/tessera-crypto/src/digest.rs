use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_string;

/// Name recorded alongside stamped digests.
pub const DIGEST_ALGORITHM: &str = "SHA-256";

/// Number of SHA-1 bytes used for a minted handle suffix.
const HANDLE_DIGEST_BYTES: usize = 10;

/// Hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hex SHA-256 of the canonical encoding of `value`.
pub fn digest_json(value: &Value) -> String {
    sha256_hex(canonical_string(value).as_bytes())
}

/// Hex of the first ten bytes of SHA-1 over `data`, used as a handle suffix.
pub fn handle_digest(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    hex::encode(&digest[..HANDLE_DIGEST_BYTES])
}

/// Incremental SHA-256 that also counts bytes, for payload streams.
#[derive(Clone, Default)]
pub struct StreamingDigest {
    hasher: Sha256,
    size: u64,
}

impl StreamingDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.size += chunk.len() as u64;
    }

    /// Hex digest and total byte count.
    pub fn finish(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.size)
    }
}

impl std::fmt::Debug for StreamingDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDigest")
            .field("size", &self.size)
            .finish()
    }
}
