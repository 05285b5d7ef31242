//! Abstract request/response boundary. The gateway consumes these instead
//! of a concrete framework's types; adapters on the outside translate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Hard transport failure from the downstream handler: no HTTP status came
/// back, so there is nothing to cache. Still reported as a metrics sample.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream request timed out")]
    Timeout,

    #[error("Upstream connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub tenant_id: Option<String>,
}

impl UpstreamRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            query: HashMap::new(),
            tenant_id: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Path plus query string with parameters in sorted order, so the same
    /// logical request always canonicalizes to the same URL.
    pub fn canonical_url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let mut params: Vec<(&String, &String)> = self.query.iter().collect();
        params.sort();
        let query: Vec<String> =
            params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl UpstreamResponse {
    pub fn new(status_code: u16, body: Vec<u8>) -> Self {
        Self {
            status_code,
            body,
            content_type: None,
            headers: HashMap::new(),
            etag: None,
            last_modified: None,
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }
}

/// The downstream side of the middleware: whatever actually talks to the
/// provider (rate-limited client, test stub, ...).
#[async_trait]
pub trait UpstreamHandler: Send + Sync {
    async fn handle(
        &self,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Where the response came from, surfaced via the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    HitStale,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::HitStale => "HIT-STALE",
            Self::Miss => "MISS",
        }
    }
}

/// What the middleware hands back to the caller. The caller maps
/// `not_modified` to a 304 and `revalidation_due` to a refresh task; the
/// middleware itself does neither.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub response: UpstreamResponse,
    pub cache_status: CacheStatus,
    pub not_modified: bool,
    pub revalidation_due: bool,
}
