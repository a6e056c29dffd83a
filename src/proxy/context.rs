//! Per-request context carried through the proxy hooks.
//!
//! Created at request arrival, discarded after the response is flushed and
//! any cache write has been handed off.

use bytes::BytesMut;
use uuid::Uuid;

use crate::cache::{unix_now, CacheKey};

/// Request lifecycle state shared between proxy hooks
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    /// Arrival time, seconds since epoch
    timestamp: u64,
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    /// Key for this request; present whenever the request shape allowed
    /// building one
    pub cache_key: Option<CacheKey>,
    /// Whether the inbound request may participate in caching
    pub request_cacheable: bool,
    /// `x-cache` verdict for the access log
    pub cache_verdict: &'static str,
    /// `x-cache-lookup` verdict for the access log
    pub lookup_verdict: &'static str,
    /// Origin status code observed on the miss path
    pub upstream_status: Option<u16>,
    /// Origin headers captured for the cache write (lowercase names,
    /// repeated values comma-joined)
    pub upstream_headers: Vec<(String, String)>,
    /// Body capture buffer; present only while the response is cacheable
    pub capture: Option<BytesMut>,
    /// Response body bytes relayed to the client
    pub body_bytes_sent: u64,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            timestamp: unix_now(),
            method: String::new(),
            path: String::new(),
            user_agent: None,
            cache_key: None,
            request_cacheable: false,
            cache_verdict: "MISS",
            lookup_verdict: "MISS",
            upstream_status: None,
            upstream_headers: Vec::new(),
            capture: None,
            body_bytes_sent: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
