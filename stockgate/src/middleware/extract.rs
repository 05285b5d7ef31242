//! Provider and request-type extraction. Both come from the request path
//! (`/api/{provider}/{request_type}/...`) with header overrides, and both
//! are constrained to explicit allow-lists: anything unrecognized maps to
//! "unknown" so arbitrary header/path content cannot mint cache-key space.

use crate::middleware::http::UpstreamRequest;
use std::collections::HashSet;

pub const UNKNOWN: &str = "unknown";

pub const DEFAULT_PROVIDERS: &[&str] =
    &["shutterstock", "getty", "adobe_stock", "unsplash", "pexels"];

pub const DEFAULT_REQUEST_TYPES: &[&str] =
    &["search", "asset", "license", "collection", "account"];

const PROVIDER_HEADER: &str = "x-provider";
const REQUEST_TYPE_HEADER: &str = "x-request-type";

#[derive(Debug, Clone)]
pub struct RequestClassifier {
    providers: HashSet<String>,
    request_types: HashSet<String>,
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROVIDERS.iter().map(|s| s.to_string()),
            DEFAULT_REQUEST_TYPES.iter().map(|s| s.to_string()),
        )
    }
}

impl RequestClassifier {
    pub fn new(
        providers: impl IntoIterator<Item = String>,
        request_types: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            request_types: request_types
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn provider_for(&self, request: &UpstreamRequest) -> String {
        let candidate = request
            .header(PROVIDER_HEADER)
            .map(str::to_string)
            .or_else(|| path_segment_after_api(&request.path, 0));
        allow_listed(candidate, &self.providers)
    }

    pub fn request_type_for(&self, request: &UpstreamRequest) -> String {
        let candidate = request
            .header(REQUEST_TYPE_HEADER)
            .map(str::to_string)
            .or_else(|| path_segment_after_api(&request.path, 1));
        allow_listed(candidate, &self.request_types)
    }
}

fn allow_listed(candidate: Option<String>, allowed: &HashSet<String>) -> String {
    match candidate {
        Some(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            if allowed.contains(&normalized) {
                normalized
            } else {
                UNKNOWN.to_string()
            }
        }
        None => UNKNOWN.to_string(),
    }
}

fn path_segment_after_api(path: &str, offset: usize) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == "api")?;
    segments.nth(offset).map(str::to_string)
}
