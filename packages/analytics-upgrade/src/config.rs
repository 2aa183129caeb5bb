//! Upgrader configuration (YAML schema v1)
//!
//! ```yaml
//! version: 1
//! max_rounds: 50
//! stores:
//!   mongo:
//!     path: ./data/mongo
//!     initial_version: 2
//!   elastic:
//!     path: ./data/elastic
//! ```
//!
//! `stores` maps a controller name to the document store it migrates. A
//! controller whose store is already attached to the `UpgradeContext` (tests,
//! embedding applications) does not need an entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::version::Version;

/// Schema versions this binary understands
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "ANALYTICS_UPGRADE_CONFIG";

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing version field in YAML
    #[error("Missing 'version' field in configuration file. Add 'version: 1' to the top of your YAML file.")]
    MissingVersion,

    /// Unsupported version
    #[error("Unsupported configuration version {found}. Supported versions: {}", supported.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    /// `max_rounds: 0` can never converge
    #[error("max_rounds must be at least 1")]
    ZeroRounds,

    /// IO error
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where a controller's store lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// Directory of the JSON document store
    pub path: PathBuf,

    /// Version assumed when the store has no version record yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_version: Option<Version>,
}

/// YAML Schema v1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeConfig {
    /// Schema version (always 1 for v1)
    pub version: u32,

    /// Abort with an error after this many rounds. Unset = no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,

    /// Controller name -> store settings
    #[serde(default)]
    pub stores: BTreeMap<String, StoreSettings>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            max_rounds: None,
            stores: BTreeMap::new(),
        }
    }
}

impl UpgradeConfig {
    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse YAML text, checking the schema version before the body
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        let found = raw
            .get("version")
            .and_then(serde_yaml::Value::as_u64)
            .ok_or(ConfigError::MissingVersion)?;
        let found = u32::try_from(found).unwrap_or(u32::MAX);
        if !SUPPORTED_VERSIONS.contains(&found) {
            return Err(ConfigError::UnsupportedVersion {
                found,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let config: Self = serde_yaml::from_value(raw)?;
        if config.max_rounds == Some(0) {
            return Err(ConfigError::ZeroRounds);
        }
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn store(&self, controller: &str) -> Option<&StoreSettings> {
        self.stores.get(controller)
    }

    /// Builder helper: point `controller` at a store directory
    pub fn with_store(mut self, controller: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.stores.insert(
            controller.into(),
            StoreSettings {
                path: path.into(),
                initial_version: None,
            },
        );
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<u32>) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}
