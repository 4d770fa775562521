//! Bridge configuration file.
//!
//! ```json
//! {
//!   "peers": [
//!     { "name": "vault", "type": "storage", "baseDir": "vault/", "scanInterval": 30 }
//!   ]
//! }
//! ```
//!
//! Fields other than `name`, `type` and `baseDir` are backend-specific and
//! kept as-is in [`PeerConfig::options`].

use std::path::Path;

use livesync_bridge_core::PeerIdentity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::error::{BridgeError, Result};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// One peer descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub base_dir: String,
    /// Backend-specific fields.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl PeerConfig {
    /// The identity this descriptor configures.
    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity::new(&self.name, &self.kind, &self.base_dir)
    }

    /// A backend option as a string.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// A backend option as an unsigned integer.
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }
}

impl BridgeConfig {
    /// Parse a configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse the configuration file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Like [`BridgeConfig::load`], but a missing or malformed file is
    /// logged and yields an empty peer set.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path).await {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "could not parse configuration; continuing without peers");
                Self::default()
            }
        }
    }
}
