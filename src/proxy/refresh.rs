//! Background cache refresh.
//!
//! When a stale entry is served, the origin is re-fetched on a detached
//! task with no client attached. The refreshed representation replaces the
//! cached one if its headers permit storage. Every failure here is logged
//! and swallowed; there is nobody to report it to.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{freshness, CacheEntry, CacheKey, TieredCache};

/// The request shape mirrored to the origin for a refresh
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub method: String,
    pub uri: String,
    /// Inbound request headers, mirrored to the origin
    pub headers: Vec<(String, String)>,
}

/// Re-fetch one entry from the origin and write it through the cache.
///
/// Refreshes only run for GET/HEAD (the only methods that get cached), so
/// there is never a request body to stream.
pub async fn refresh_entry(
    client: reqwest::Client,
    origin_host: String,
    origin_port: u16,
    request: RefreshRequest,
    key: CacheKey,
    cache: Arc<TieredCache>,
) {
    let url = format!("http://{}:{}{}", origin_host, origin_port, request.uri);

    let method = match reqwest::Method::from_bytes(request.method.as_bytes()) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(method = %request.method, error = %e, "Invalid refresh method");
            return;
        }
    };

    let mut builder = client.request(method, &url);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }

    let response = match builder.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Background refresh failed");
            return;
        }
    };

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());

    let body = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Background refresh body read failed");
            return;
        }
    };

    let cache_control = header_value(&headers, "cache-control");
    let pragma = header_value(&headers, "pragma");
    if !freshness::is_response_cacheable(cache_control, pragma) {
        // The previously stored entry is deliberately left in place.
        tracing::debug!(url = %url, "Refreshed response not cacheable, keeping old entry");
        return;
    }

    let entry = CacheEntry::new(status, headers, Bytes::from(body.to_vec()));
    tracing::debug!(key = %key, status = status, bytes = entry.payload_size(), "Background refresh stored");
    cache.put(key, entry).await;
}

/// Build a refresh client honoring the configured origin timeout.
/// No timeout configured means wait indefinitely, matching the
/// synchronous proxy path.
pub fn build_client(timeout_seconds: Option<u64>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().unwrap_or_default()
}

/// Flatten a reqwest header map into lowercase name/value pairs with
/// repeated headers comma-joined, the same shape the sync path captures.
fn collect_headers(map: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for (name, value) in map {
        let name = name.as_str().to_ascii_lowercase();
        let value = String::from_utf8_lossy(value.as_bytes()).to_string();
        if let Some((_, existing)) = headers.iter_mut().find(|(n, _)| *n == name) {
            existing.push_str(", ");
            existing.push_str(&value);
        } else {
            headers.push((name, value));
        }
    }
    headers
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_headers_lowercases_and_joins_repeats() {
        let mut map = reqwest::header::HeaderMap::new();
        map.insert("Content-Type", "text/plain".parse().unwrap());
        map.append("Set-Cookie", "a=1".parse().unwrap());
        map.append("Set-Cookie", "b=2".parse().unwrap());

        let headers = collect_headers(&map);
        assert_eq!(header_value(&headers, "content-type"), Some("text/plain"));
        assert_eq!(header_value(&headers, "set-cookie"), Some("a=1, b=2"));
    }

    #[test]
    fn test_build_client_without_timeout() {
        // No timeout configured: the client must build and impose none
        let _client = build_client(None);
        let _client = build_client(Some(5));
    }

    #[tokio::test]
    async fn test_refresh_against_unreachable_origin_is_swallowed() {
        use crate::cache::{MemoryCache, TieredCache};

        let cache = Arc::new(TieredCache::new(MemoryCache::new(10, 1024), None));
        let key = CacheKey::new("127.0.0.1", 1, "GET", "/x", "example.com");
        let request = RefreshRequest {
            method: "GET".to_string(),
            uri: "/x".to_string(),
            headers: vec![("host".to_string(), "example.com".to_string())],
        };

        // Port 1 refuses connections; the refresh must fail silently
        refresh_entry(
            build_client(Some(1)),
            "127.0.0.1".to_string(),
            1,
            request,
            key.clone(),
            cache.clone(),
        )
        .await;

        assert!(cache.get_with_source(&key).await.is_none());
    }
}
