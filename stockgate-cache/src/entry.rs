use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status-code class used to pick TTL bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Everything else (other 4xx, odd statuses)
    ClientError,
}

impl StatusClass {
    pub fn from_status(status_code: u16) -> Self {
        match status_code {
            200..=299 => Self::Success,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }
}

/// Opaque cached response payload: raw bytes plus a content-type tag.
/// (De)serialization of the body is the caller's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePayload {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// Response headers worth replaying alongside the body.
    pub headers: HashMap<String, String>,
}

impl CachePayload {
    pub fn new(body: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            body,
            content_type,
            headers: HashMap::new(),
        }
    }

    pub fn approx_size(&self) -> usize {
        self.body.len()
            + self.content_type.as_ref().map_or(0, String::len)
            + self
                .headers
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// One cached response.
///
/// Invariants: `expires_at > created_at`; when `stale_until` is set it lies
/// in `[expires_at, expires_at + swr.max_ttl]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque storage key this entry is stored under.
    pub key: String,
    pub value: CachePayload,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// End of the stale-while-revalidate window, if SWR applies.
    pub stale_until: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub provider: String,
    pub request_type: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// True when the entry is past `expires_at` but still inside its
    /// stale-while-revalidate window.
    pub fn is_within_stale_window(&self, now: DateTime<Utc>) -> bool {
        match self.stale_until {
            Some(stale_until) => now >= self.expires_at && now < stale_until,
            None => false,
        }
    }

    /// The point after which the entry is unusable and sweepable.
    pub fn effective_deadline(&self) -> DateTime<Utc> {
        self.stale_until.unwrap_or(self.expires_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.effective_deadline()
    }

    /// Seconds of freshness left; zero once expired.
    pub fn remaining_fresh_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_seconds().max(0) as u64
    }

    pub fn approx_size(&self) -> usize {
        self.key.len() + self.value.approx_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(now: DateTime<Utc>, ttl_secs: i64, swr_secs: Option<i64>) -> CacheEntry {
        let expires_at = now + Duration::seconds(ttl_secs);
        CacheEntry {
            key: "k".to_string(),
            value: CachePayload::new(b"body".to_vec(), None),
            status_code: 200,
            created_at: now,
            expires_at,
            stale_until: swr_secs.map(|s| expires_at + Duration::seconds(s)),
            access_count: 0,
            last_accessed: now,
            provider: "unsplash".to_string(),
            request_type: "search".to_string(),
            etag: None,
            last_modified: None,
        }
    }

    #[test]
    fn status_classes() {
        assert_eq!(StatusClass::from_status(200), StatusClass::Success);
        assert_eq!(StatusClass::from_status(204), StatusClass::Success);
        assert_eq!(StatusClass::from_status(429), StatusClass::RateLimited);
        assert_eq!(StatusClass::from_status(500), StatusClass::ServerError);
        assert_eq!(StatusClass::from_status(503), StatusClass::ServerError);
        assert_eq!(StatusClass::from_status(404), StatusClass::ClientError);
        assert_eq!(StatusClass::from_status(301), StatusClass::ClientError);
    }

    #[test]
    fn freshness_and_stale_window() {
        let now = Utc::now();
        let e = entry(now, 60, Some(120));

        assert!(e.is_fresh(now));
        assert!(!e.is_within_stale_window(now));

        let at_expiry = now + Duration::seconds(60);
        assert!(!e.is_fresh(at_expiry));
        assert!(e.is_within_stale_window(at_expiry));
        assert!(!e.is_expired(at_expiry));

        let past_stale = now + Duration::seconds(180);
        assert!(e.is_expired(past_stale));
    }

    #[test]
    fn no_swr_expires_at_ttl() {
        let now = Utc::now();
        let e = entry(now, 60, None);
        assert!(!e.is_within_stale_window(now + Duration::seconds(61)));
        assert!(e.is_expired(now + Duration::seconds(60)));
        assert_eq!(e.effective_deadline(), e.expires_at);
    }

    #[test]
    fn remaining_secs_clamps_to_zero() {
        let now = Utc::now();
        let e = entry(now, 60, None);
        assert_eq!(e.remaining_fresh_secs(now + Duration::seconds(120)), 0);
        assert_eq!(e.remaining_fresh_secs(now), 60);
    }
}
