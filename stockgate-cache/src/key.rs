//! Cache-key derivation. Header and query-parameter subsets are normalized
//! (lowercased keys, sorted) before hashing so key equality does not depend
//! on the order a client happened to send them in.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Request headers that participate in the cache key. Everything else is
/// ignored so arbitrary client headers cannot fragment the cache.
pub const CACHE_RELEVANT_HEADERS: &[&str] =
    &["accept", "accept-language", "x-api-version"];

/// Identity of one cacheable upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub provider: String,
    pub request_type: String,
    pub method: String,
    pub url: String,
    pub headers_hash: String,
    pub params_hash: String,
    /// Tenant scope. `None` means the anonymous scope; malformed ids are
    /// dropped rather than rejected.
    pub tenant_id: Option<Uuid>,
}

impl CacheKey {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: &str,
        request_type: &str,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        params: &HashMap<String, String>,
        tenant_id: Option<&str>,
    ) -> Self {
        let relevant: Vec<(String, String)> = headers
            .iter()
            .filter_map(|(k, v)| {
                let k = k.to_ascii_lowercase();
                CACHE_RELEVANT_HEADERS
                    .contains(&k.as_str())
                    .then(|| (k, v.clone()))
            })
            .collect();
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            provider: provider.to_string(),
            request_type: request_type.to_string(),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            headers_hash: digest_pairs(relevant),
            params_hash: digest_pairs(params),
            tenant_id: parse_tenant_id(tenant_id),
        }
    }

    /// Collapse the whole tuple into one opaque storage key.
    pub fn storage_key(&self) -> String {
        let tenant = self
            .tenant_id
            .map_or_else(|| "anonymous".to_string(), |id| id.to_string());
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.provider,
            self.request_type,
            self.method,
            self.url,
            self.headers_hash,
            self.params_hash,
            tenant,
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Validate a tenant id. Anything that is not a well-formed UUID scopes the
/// request to the anonymous tenant instead of failing it.
pub fn parse_tenant_id(raw: Option<&str>) -> Option<Uuid> {
    let raw = raw?;
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Malformed tenant id dropped, scoping to anonymous");
            None
        }
    }
}

fn digest_pairs(mut pairs: Vec<(String, String)>) -> String {
    pairs.sort();
    let mut hasher = Sha256::new();
    for (k, v) in &pairs {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(&hasher.finalize()[..8])
}
