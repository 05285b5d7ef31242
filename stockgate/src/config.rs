//! Gateway configuration loading. The core crates receive constructed
//! config structs and never read files themselves; this module is the glue
//! an embedding service uses to build them from YAML.

use crate::middleware::extract::{DEFAULT_PROVIDERS, DEFAULT_REQUEST_TYPES};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use stockgate_cache::CacheConfig;
use stockgate_incident::DetectorConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Allow-lists for provider / request-type extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowListConfig {
    pub providers: Vec<String>,
    pub request_types: Vec<String>,
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            providers: DEFAULT_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            request_types: DEFAULT_REQUEST_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub cache: CacheConfig,
    pub detector: DetectorConfig,
    pub allow: AllowListConfig,
}

impl GatewayConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}
