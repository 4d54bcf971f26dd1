//! Cryptographic primitives for Tessera.
//!
//! Provides canonical (key-order and whitespace independent) JSON encoding,
//! SHA-256 content digests, streaming payload digests, the SHA-1 digest used
//! for handle minting, and PBKDF2 salted secret hashing.
//!
//! All crypto operations wrap established libraries; there are no custom primitives.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod secret;

pub use canonical::{canonical_string, canonicalize};
pub use digest::{digest_json, handle_digest, sha256_hex, StreamingDigest, DIGEST_ALGORITHM};
pub use error::{CryptoError, CryptoResult};
pub use secret::{KdfAlgorithm, SecretHash};
