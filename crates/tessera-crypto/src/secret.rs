use std::fmt;

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use tessera_types::internal::{ALGORITHM, HASH, ITERATIONS, SALT};

use crate::error::{CryptoError, CryptoResult};

const SALT_BYTES: usize = 16;
const KEY_BYTES: usize = 32;

/// PRF used by PBKDF2.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    /// Records written before the algorithm was recorded use this.
    #[default]
    #[serde(rename = "PBKDF2WithHmacSHA1")]
    HmacSha1,
    #[serde(rename = "PBKDF2WithHmacSHA256")]
    HmacSha256,
}

impl KdfAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha1 => "PBKDF2WithHmacSHA1",
            Self::HmacSha256 => "PBKDF2WithHmacSHA256",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "PBKDF2WithHmacSHA1" => Some(Self::HmacSha1),
            "PBKDF2WithHmacSHA256" => Some(Self::HmacSha256),
            _ => None,
        }
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A salted PBKDF2 digest of a secret. Never holds the secret itself.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHash {
    /// Hex-encoded derived key.
    pub hash: String,
    /// Hex-encoded salt.
    pub salt: String,
    pub iterations: u32,
    pub algorithm: KdfAlgorithm,
}

impl SecretHash {
    /// Iteration count for newly written records.
    pub const DEFAULT_ITERATIONS: u32 = 10_000;
    /// Iteration count assumed when a stored record does not carry one.
    pub const LEGACY_ITERATIONS: u32 = 2048;

    /// Hash `secret` under a fresh random salt.
    pub fn generate(secret: &str, iterations: u32, algorithm: KdfAlgorithm) -> CryptoResult<Self> {
        let mut salt = [0u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(secret, &salt, iterations, algorithm)
    }

    /// Hash `secret` under an explicit salt.
    pub fn with_salt(
        secret: &str,
        salt: &[u8],
        iterations: u32,
        algorithm: KdfAlgorithm,
    ) -> CryptoResult<Self> {
        let key = derive_key(secret.as_bytes(), salt, iterations, algorithm);
        Ok(Self {
            hash: hex::encode(key),
            salt: hex::encode(salt),
            iterations,
            algorithm,
        })
    }

    /// Check `secret` against this record in constant time.
    pub fn verify(&self, secret: &str) -> CryptoResult<bool> {
        let salt = hex::decode(&self.salt)
            .map_err(|e| CryptoError::MalformedRecord(format!("salt: {e}")))?;
        let expected = hex::decode(&self.hash)
            .map_err(|e| CryptoError::MalformedRecord(format!("hash: {e}")))?;
        let actual = derive_key(secret.as_bytes(), &salt, self.iterations, self.algorithm);
        Ok(expected.as_slice().ct_eq(actual.as_slice()).into())
    }

    /// Write the record's fields into an internal-metadata style map.
    pub fn write_into(&self, map: &mut Map<String, Value>) {
        map.insert(HASH.into(), Value::String(self.hash.clone()));
        map.insert(SALT.into(), Value::String(self.salt.clone()));
        map.insert(ITERATIONS.into(), Value::String(self.iterations.to_string()));
        map.insert(ALGORITHM.into(), Value::String(self.algorithm.as_str().into()));
    }

    /// The record as a standalone JSON object.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        self.write_into(&mut map);
        Value::Object(map)
    }

    /// Read a record from a map holding `hash`/`salt` and optionally
    /// `iterations`/`algorithm`. Returns `None` when no hash is present.
    pub fn read_from(map: &Map<String, Value>) -> CryptoResult<Option<Self>> {
        let Some(hash) = map.get(HASH).and_then(Value::as_str) else {
            return Ok(None);
        };
        let salt = map
            .get(SALT)
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::MalformedRecord("hash without salt".into()))?;
        let iterations = match map.get(ITERATIONS) {
            None | Some(Value::Null) => Self::LEGACY_ITERATIONS,
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| CryptoError::MalformedRecord(format!("iterations: {s}")))?,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| CryptoError::MalformedRecord(format!("iterations: {n}")))?,
            Some(other) => {
                return Err(CryptoError::MalformedRecord(format!("iterations: {other}")))
            }
        };
        let algorithm = match map.get(ALGORITHM).and_then(Value::as_str) {
            None => KdfAlgorithm::default(),
            Some(name) => KdfAlgorithm::parse(name)
                .ok_or_else(|| CryptoError::MalformedRecord(format!("algorithm: {name}")))?,
        };
        Ok(Some(Self {
            hash: hash.to_string(),
            salt: salt.to_string(),
            iterations,
            algorithm,
        }))
    }

    /// Same as [`Self::read_from`] for an arbitrary JSON value.
    pub fn from_json(value: &Value) -> CryptoResult<Option<Self>> {
        match value.as_object() {
            Some(map) => Self::read_from(map),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHash")
            .field("iterations", &self.iterations)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn derive_key(secret: &[u8], salt: &[u8], iterations: u32, algorithm: KdfAlgorithm) -> [u8; KEY_BYTES] {
    let mut out = [0u8; KEY_BYTES];
    match algorithm {
        KdfAlgorithm::HmacSha1 => pbkdf2_hmac::<Sha1>(secret, salt, iterations, &mut out),
        KdfAlgorithm::HmacSha256 => pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut out),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6070_sha1_vector() {
        // RFC 6070: P="password", S="salt", c=2, dkLen=20
        let h = SecretHash::with_salt("password", b"salt", 2, KdfAlgorithm::HmacSha1).unwrap();
        assert!(h.hash.starts_with("ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957"));
        assert_eq!(h.hash.len(), KEY_BYTES * 2);
    }

    #[test]
    fn sha256_vector() {
        // PBKDF2-HMAC-SHA256, P="password", S="salt", c=1, dkLen=32
        let h = SecretHash::with_salt("password", b"salt", 1, KdfAlgorithm::HmacSha256).unwrap();
        assert_eq!(
            h.hash,
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn verify_rejects_truncated_digest() {
        let mut h = SecretHash::generate("pw", 5, KdfAlgorithm::HmacSha256).unwrap();
        assert!(h.verify("pw").unwrap());
        h.hash.truncate(KEY_BYTES);
        assert!(!h.verify("pw").unwrap());
    }

    #[test]
    fn generate_then_verify() {
        let h = SecretHash::generate("secret123", 50, KdfAlgorithm::HmacSha256).unwrap();
        assert!(h.verify("secret123").unwrap());
        assert!(!h.verify("secret124").unwrap());
        assert_eq!(h.salt.len(), SALT_BYTES * 2);
    }

    #[test]
    fn fresh_salt_each_time() {
        let a = SecretHash::generate("same", 10, KdfAlgorithm::HmacSha1).unwrap();
        let b = SecretHash::generate("same", 10, KdfAlgorithm::HmacSha1).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn map_encoding_stores_iterations_as_string() {
        let h = SecretHash::generate("pw", 20, KdfAlgorithm::HmacSha256).unwrap();
        let json = h.to_json();
        assert_eq!(json["iterations"], "20");
        assert_eq!(json["algorithm"], "PBKDF2WithHmacSHA256");
        let back = SecretHash::from_json(&json).unwrap().unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn legacy_record_defaults() {
        let h = SecretHash::with_salt("pw", b"0123456789abcdef", 2048, KdfAlgorithm::HmacSha1).unwrap();
        let mut map = Map::new();
        map.insert("hash".into(), h.hash.clone().into());
        map.insert("salt".into(), h.salt.clone().into());
        let back = SecretHash::read_from(&map).unwrap().unwrap();
        assert_eq!(back.iterations, SecretHash::LEGACY_ITERATIONS);
        assert_eq!(back.algorithm, KdfAlgorithm::HmacSha1);
        assert!(back.verify("pw").unwrap());
    }

    #[test]
    fn absent_hash_reads_as_none() {
        assert!(SecretHash::read_from(&Map::new()).unwrap().is_none());
    }

    #[test]
    fn debug_hides_digest() {
        let h = SecretHash::generate("pw", 5, KdfAlgorithm::HmacSha1).unwrap();
        assert!(!format!("{h:?}").contains(&h.hash));
    }
}
