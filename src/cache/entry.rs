//! Cache key and entry types
//!
//! This module defines the core cache structures:
//! - `CacheKey`: Deterministic identifier for a cached response (upstream
//!   target + request method + path + Host header)
//! - `CacheEntry`: A captured origin response with its capture timestamp

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::CacheError;

/// Serialization format version for schema evolution
const SERIALIZATION_VERSION: u8 = 1;

/// Cache key identifying one cached representation.
///
/// Two requests that agree on all five fields always produce equal keys;
/// a difference in any single field yields a different key.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    /// Configured upstream host the request would be forwarded to
    pub upstream_host: String,
    /// Configured upstream port
    pub upstream_port: u16,
    /// Request method (GET or HEAD for cacheable requests)
    pub method: String,
    /// Request path including the query string
    pub uri: String,
    /// `Host` header of the inbound request
    pub host_header: String,
}

impl CacheKey {
    pub fn new(
        upstream_host: &str,
        upstream_port: u16,
        method: &str,
        uri: &str,
        host_header: &str,
    ) -> Self {
        Self {
            upstream_host: upstream_host.to_string(),
            upstream_port,
            method: method.to_string(),
            uri: uri.to_string(),
            host_header: host_header.to_string(),
        }
    }

    /// Lowercase hex SHA-256 over the length-prefixed key fields.
    /// Used as the disk cache filename (content-addressed storage).
    ///
    /// Each field is hashed as `len(be64) || bytes`, so field boundaries
    /// stay unambiguous no matter what bytes the client puts in the uri
    /// or Host header. The `Display` form is NOT the hash input.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.upstream_host.as_str(),
            self.method.as_str(),
            self.host_header.as_str(),
            self.uri.as_str(),
        ] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(self.upstream_port.to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for CacheKey {
    /// Log-friendly form only; not injective and never hashed
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.upstream_host, self.upstream_port, self.method, self.host_header, self.uri
        )
    }
}

/// A captured origin response. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Capture time, seconds since UNIX epoch
    pub timestamp: u64,
    /// Origin status code
    pub status_code: u16,
    /// Response headers in arrival order. Names are lowercase; values of
    /// repeated headers are comma-joined.
    pub headers: Vec<(String, String)>,
    /// Raw response body. Binary-safe; round-trips through storage exactly.
    pub body: Bytes,
}

/// Serializable wrapper with version marker (MessagePack on disk).
/// The body travels as `Vec<u8>`, which round-trips arbitrary bytes exactly.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    version: u8,
    timestamp: u64,
    status_code: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CacheEntry {
    /// Create a new entry captured at the current wall-clock time.
    pub fn new(status_code: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            timestamp: unix_now(),
            status_code,
            headers,
            body,
        }
    }

    /// Elapsed seconds since capture, relative to `now`.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    /// Case-insensitive single-header lookup. Stored names are lowercase.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Byte length of the stored payload. This is what memory accounting
    /// uses; a stale `content-length` header is never trusted.
    pub fn payload_size(&self) -> usize {
        self.body.len()
    }

    /// Encode to the on-disk MessagePack representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CacheError> {
        let stored = StoredEntry {
            version: SERIALIZATION_VERSION,
            timestamp: self.timestamp,
            status_code: self.status_code,
            headers: self.headers.clone(),
            body: self.body.to_vec(),
        };
        rmp_serde::to_vec(&stored)
            .map_err(|e| CacheError::Serialization(format!("MessagePack encoding failed: {}", e)))
    }

    /// Decode the on-disk representation. Fails on version mismatch or
    /// corrupt input; callers treat that as a cache miss.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        let stored: StoredEntry = rmp_serde::from_slice(bytes)
            .map_err(|e| CacheError::Serialization(format!("MessagePack decoding failed: {}", e)))?;
        if stored.version != SERIALIZATION_VERSION {
            return Err(CacheError::Serialization(format!(
                "Unsupported entry version {}",
                stored.version
            )));
        }
        Ok(Self {
            timestamp: stored.timestamp,
            status_code: stored.status_code,
            headers: stored.headers,
            body: Bytes::from(stored.body),
        })
    }
}

/// Current wall-clock time as seconds since UNIX epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
