use serde::{Deserialize, Serialize};
use tessera_crypto::SecretHash;

/// Knobs the field stages read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Handle-minting prefix, used by `prependHandleMintingConfigPrefix`.
    pub minting_prefix: Option<String>,
    /// Minimum password length in characters.
    pub min_password_length: usize,
    /// PBKDF2 iterations for newly hashed secrets.
    pub hash_iterations: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            minting_prefix: None,
            min_password_length: 1,
            hash_iterations: SecretHash::DEFAULT_ITERATIONS,
        }
    }
}

impl PipelineSettings {
    pub fn minting_prefix(&self) -> Option<&str> {
        self.minting_prefix.as_deref()
    }
}
