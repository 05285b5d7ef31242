//! Cache configuration. Constructed once by an external loader and handed
//! to `EdgeCache`; immutable afterwards. Every section has serde defaults so
//! partial YAML/JSON documents deserialize into something usable.

use crate::entry::StatusClass;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};

/// TTL bounds for one status class, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlBounds {
    pub default_secs: u64,
    pub min_secs: u64,
    pub max_secs: u64,
}

impl TtlBounds {
    pub const fn new(default_secs: u64, min_secs: u64, max_secs: u64) -> Self {
        Self {
            default_secs,
            min_secs,
            max_secs,
        }
    }

    /// Resolve a requested TTL against these bounds.
    pub fn clamp(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_secs)
            .clamp(self.min_secs, self.max_secs)
    }
}

/// Per-status-class TTL bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub success: TtlBounds,
    pub rate_limited: TtlBounds,
    pub server_error: TtlBounds,
    pub client_error: TtlBounds,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            success: TtlBounds::new(300, 60, 3600),
            rate_limited: TtlBounds::new(60, 30, 300),
            server_error: TtlBounds::new(30, 10, 120),
            client_error: TtlBounds::new(120, 30, 600),
        }
    }
}

impl TtlConfig {
    pub fn bounds_for(&self, class: StatusClass) -> TtlBounds {
        match class {
            StatusClass::Success => self.success,
            StatusClass::RateLimited => self.rate_limited,
            StatusClass::ServerError => self.server_error,
            StatusClass::ClientError => self.client_error,
        }
    }
}

/// Stale-while-revalidate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwrConfig {
    pub enabled: bool,
    /// The stale window is `ttl * ttl_multiplier`, capped by `max_ttl_secs`.
    pub ttl_multiplier: f64,
    pub max_ttl_secs: u64,
}

impl Default for SwrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_multiplier: 2.0,
            max_ttl_secs: 1800,
        }
    }
}

/// Storage settings for the entry store and its background sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_entries: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl: TtlConfig,
    pub swr: SwrConfig,
    pub storage: StorageConfig,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), CacheError> {
        for (name, bounds) in [
            ("success", self.ttl.success),
            ("rate_limited", self.ttl.rate_limited),
            ("server_error", self.ttl.server_error),
            ("client_error", self.ttl.client_error),
        ] {
            if bounds.min_secs == 0 || bounds.min_secs > bounds.max_secs {
                return Err(CacheError::InvalidConfig(format!(
                    "ttl bounds for {name} must satisfy 0 < min <= max"
                )));
            }
        }
        if self.swr.enabled && self.swr.ttl_multiplier <= 0.0 {
            return Err(CacheError::InvalidConfig(
                "swr ttl_multiplier must be positive".to_string(),
            ));
        }
        if self.storage.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "storage max_entries must be positive".to_string(),
            ));
        }
        if self.storage.cleanup_interval_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "storage cleanup_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
