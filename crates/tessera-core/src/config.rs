use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_crypto::SecretHash;
use tessera_gate::PipelineSettings;

/// Errors loading a [`RepositoryConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// RepositoryConfig
// ---------------------------------------------------------------------------

/// Per-instance settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Cluster member id. Generated when absent.
    pub member_id: Option<String>,
    /// Origin tag stamped on outgoing replication messages.
    pub cluster_id: String,
    pub read_only: bool,
    /// Enables the file-backed ledger and reprocessing queue.
    pub data_dir: Option<PathBuf>,
    pub min_password_length: usize,
    pub hash_iterations: u32,
    /// Queued transactions younger than this are left for a later drain.
    #[serde(with = "seconds")]
    pub reprocessing_delay: Duration,
    #[serde(with = "seconds")]
    pub reprocessing_interval: Duration,
    #[serde(with = "seconds")]
    pub auth_precache_throttle: Duration,
    pub worker_threads: usize,
    pub worker_queue_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            member_id: None,
            cluster_id: "tessera".into(),
            read_only: false,
            data_dir: None,
            min_password_length: 1,
            hash_iterations: SecretHash::DEFAULT_ITERATIONS,
            reprocessing_delay: Duration::from_secs(120),
            reprocessing_interval: Duration::from_secs(60),
            auth_precache_throttle: Duration::from_secs(120),
            worker_threads: 4,
            worker_queue_capacity: 1024,
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Field-pipeline settings under the given minting prefix.
    pub fn pipeline_settings(&self, minting_prefix: Option<&str>) -> PipelineSettings {
        PipelineSettings {
            minting_prefix: minting_prefix.map(str::to_string),
            min_password_length: self.min_password_length,
            hash_iterations: self.hash_iterations,
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// Design
// ---------------------------------------------------------------------------

/// Handle minting policy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandleMinting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Content of the singleton design object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Design {
    #[serde(rename = "handleMintingConfig")]
    pub handle_minting: HandleMinting,
    pub enable_version_edits: bool,
    #[serde(rename = "includePayloadsInReplicationMessages")]
    pub include_payloads_in_replication: bool,
    /// Schema object id to schema name.
    pub schema_ids: BTreeMap<String, String>,
    #[serde(rename = "authConfig", skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    #[serde(rename = "uiConfig", skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
}

impl Design {
    /// Default prefix for minted handles.
    pub const DEFAULT_PREFIX: &'static str = "test";

    /// Minting prefix without a trailing slash.
    pub fn minting_prefix(&self) -> &str {
        let prefix = self
            .handle_minting
            .prefix
            .as_deref()
            .unwrap_or(Self::DEFAULT_PREFIX);
        prefix.strip_suffix('/').unwrap_or(prefix)
    }
}
