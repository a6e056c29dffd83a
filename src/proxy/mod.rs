// Proxy module - Pingora ProxyHttp implementation
// Implements the caching reverse-proxy request state machine

pub mod context;
pub mod refresh;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Local;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::ResponseHeader;
use pingora_proxy::{FailToProxy, ProxyHttp, Session};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{freshness, unix_now, CacheEntry, CacheKey, Freshness, TieredCache};
use crate::config::Config;
use crate::logging::{AccessLog, AccessRecord};

pub use context::RequestContext;
use refresh::RefreshRequest;

/// Headers that belong to one hop and must not be replayed from a stored
/// representation
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// KagemushaProxy implements the Pingora ProxyHttp trait.
///
/// Owns the tiered cache, the configuration and the access log explicitly;
/// every hook receives the per-request state through `RequestContext`, so
/// there is no hidden cross-request aliasing.
pub struct KagemushaProxy {
    config: Arc<Config>,
    cache: Arc<TieredCache>,
    access_log: Arc<AccessLog>,
    refresh_client: reqwest::Client,
}

impl KagemushaProxy {
    pub fn new(config: Config, cache: Arc<TieredCache>, access_log: Arc<AccessLog>) -> Self {
        let refresh_client = refresh::build_client(config.upstream.timeout_seconds);
        Self {
            config: Arc::new(config),
            cache,
            access_log,
            refresh_client,
        }
    }

    fn get_client_ip(&self, session: &Session) -> String {
        // X-Forwarded-For first (common in chained proxy setups); the
        // first entry is the original client
        if let Some(forwarded_for) = session
            .req_header()
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(client_ip) = forwarded_for.split(',').next() {
                return client_ip.trim().to_string();
            }
        }

        session
            .client_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Write a stored entry to the client with cache diagnostic headers.
    async fn serve_cached(
        &self,
        session: &mut Session,
        ctx: &mut RequestContext,
        entry: &CacheEntry,
        decision: Freshness,
    ) -> Result<()> {
        let name = &self.config.server.name;
        let age = entry.age(unix_now());

        let mut resp = ResponseHeader::build(entry.status_code, None)?;
        for (header_name, value) in &entry.headers {
            if HOP_BY_HOP_HEADERS.contains(&header_name.as_str()) {
                continue;
            }
            if resp.append_header(header_name.clone(), value.as_str()).is_err() {
                tracing::debug!(header = %header_name, "Skipping unrepresentable stored header");
            }
        }

        if let Some(len) = replay_content_length(&ctx.method, entry) {
            resp.insert_header("content-length", len)?;
        }

        // Diagnostic headers are appended, never overwritten
        resp.append_header("x-cache", format!("{} from {}", decision.cache_verdict(), name))?;
        resp.append_header(
            "x-cache-lookup",
            format!("{} from {}", decision.lookup_verdict(), name),
        )?;
        resp.append_header("age", age.to_string())?;
        if decision == Freshness::Stale {
            resp.append_header("warning", "110 Response is stale")?;
            resp.append_header("via", format!("1.1 {}", name))?;
        }

        ctx.body_bytes_sent = entry.body.len() as u64;

        session.write_response_header(Box::new(resp), false).await?;
        session
            .write_response_body(Some(entry.body.clone()), true)
            .await?;
        Ok(())
    }
}

/// The content-length to set when replaying a stored entry.
///
/// Normally the stored body length is authoritative, never a stale
/// content-length header. HEAD is the exception: its capture has no body,
/// so an origin-declared length in the stored headers is kept as-is
/// (`None` here means leave the stored header alone).
fn replay_content_length(method: &str, entry: &CacheEntry) -> Option<String> {
    if method == "HEAD" && entry.header("content-length").is_some() {
        return None;
    }
    Some(entry.body.len().to_string())
}

/// Flatten an http header map into lowercase name/value pairs,
/// comma-joining repeated headers
fn collect_headers(map: &http::HeaderMap) -> Vec<(String, String)> {
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

#[async_trait]
impl ProxyHttp for KagemushaProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    /// Cache lookup and short-circuit. Returns Ok(true) when the request
    /// was answered from cache; Ok(false) hands it to the upstream flow.
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();

        let method = req.method.as_str().to_string();
        let uri = req
            .uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| req.uri.path().to_string());
        let host_header = req
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let request_headers = collect_headers(&req.headers);

        ctx.method = method.clone();
        ctx.path = uri.clone();
        ctx.user_agent = header_value(&request_headers, "user-agent").map(|s| s.to_string());

        let upstream = &self.config.upstream;
        let key = CacheKey::new(&upstream.host, upstream.port, &method, &uri, &host_header);
        ctx.cache_key = Some(key.clone());

        let cache_control = header_value(&request_headers, "cache-control").map(|s| s.to_string());
        let pragma = header_value(&request_headers, "pragma").map(|s| s.to_string());
        ctx.request_cacheable =
            freshness::is_request_cacheable(&method, cache_control.as_deref(), pragma.as_deref());

        if !ctx.request_cacheable {
            // Proxied through untouched; nothing about it is cached
            return Ok(false);
        }

        let lookup = self.cache.get_with_source(&key).await;
        let (source, entry) = match lookup {
            Some(hit) => hit,
            None => return Ok(false),
        };

        let decision = freshness::evaluate(Some(&entry), cache_control.as_deref(), unix_now());
        ctx.cache_verdict = decision.cache_verdict();
        ctx.lookup_verdict = decision.lookup_verdict();

        if !decision.is_servable() {
            // The client's own max-age rejects this entry: synchronous
            // refetch, stale data is not served
            ctx.cache_verdict = "MISS";
            ctx.lookup_verdict = "MISS";
            return Ok(false);
        }

        tracing::debug!(
            request_id = %ctx.request_id(),
            key = %key,
            source = %source,
            verdict = decision.cache_verdict(),
            "Serving from cache"
        );

        if decision.needs_refresh() {
            // Serve the stale copy now, refresh without a client attached
            tokio::spawn(refresh::refresh_entry(
                self.refresh_client.clone(),
                upstream.host.clone(),
                upstream.port,
                RefreshRequest {
                    method,
                    uri,
                    headers: request_headers,
                },
                key,
                self.cache.clone(),
            ));
        }

        self.serve_cached(session, ctx, &entry, decision).await?;
        Ok(true)
    }

    /// Route to the configured origin
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let upstream = &self.config.upstream;
        let mut peer = Box::new(HttpPeer::new(
            (upstream.host.clone(), upstream.port),
            false,
            upstream.host.clone(),
        ));

        // No configured timeout means wait indefinitely
        if let Some(secs) = upstream.timeout_seconds {
            let timeout = Duration::from_secs(secs);
            peer.options.connection_timeout = Some(timeout);
            peer.options.read_timeout = Some(timeout);
            peer.options.write_timeout = Some(timeout);
        }

        Ok(peer)
    }

    /// Record origin metadata for the cache write and append the miss-path
    /// diagnostic headers
    fn upstream_response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        ctx.upstream_status = Some(upstream_response.status.as_u16());
        // Capture the origin's headers before any diagnostics are added
        ctx.upstream_headers = collect_headers(&upstream_response.headers);

        let cache_control = header_value(&ctx.upstream_headers, "cache-control");
        let pragma = header_value(&ctx.upstream_headers, "pragma");
        if ctx.request_cacheable && freshness::is_response_cacheable(cache_control, pragma) {
            ctx.capture = Some(BytesMut::new());
        }

        let name = &self.config.server.name;
        upstream_response.append_header("x-cache", format!("{} from {}", ctx.cache_verdict, name))?;
        upstream_response.append_header(
            "x-cache-lookup",
            format!("{} from {}", ctx.lookup_verdict, name),
        )?;
        upstream_response.append_header("age", "0")?;

        Ok(())
    }

    /// Tee: every chunk goes to the client as-is and, when the response is
    /// cacheable, into the capture buffer. On completion the captured
    /// entry is committed on a detached task so the client path never
    /// waits on storage.
    fn response_body_filter(
        &self,
        _session: &mut Session,
        body: &mut Option<Bytes>,
        end_of_stream: bool,
        ctx: &mut Self::CTX,
    ) -> Result<Option<Duration>> {
        if let Some(chunk) = body {
            ctx.body_bytes_sent += chunk.len() as u64;
            if let Some(capture) = &mut ctx.capture {
                capture.extend_from_slice(chunk);
            }
        }

        if end_of_stream {
            if let (Some(capture), Some(status), Some(key)) =
                (ctx.capture.take(), ctx.upstream_status, ctx.cache_key.clone())
            {
                let headers = std::mem::take(&mut ctx.upstream_headers);
                let entry = CacheEntry::new(status, headers, capture.freeze());
                let cache = self.cache.clone();
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    key = %key,
                    bytes = entry.payload_size(),
                    "Committing captured response to cache"
                );
                tokio::spawn(async move {
                    cache.put(key, entry).await;
                });
            }
        }

        Ok(None)
    }

    /// Origin connection failure with a client waiting: HTTP 500 carrying
    /// the error text. (Background refresh failures never reach here; they
    /// are swallowed inside the refresh task.)
    async fn fail_to_proxy(
        &self,
        session: &mut Session,
        e: &pingora_core::Error,
        ctx: &mut Self::CTX,
    ) -> FailToProxy
    where
        Self::CTX: Send + Sync,
    {
        let body = e.to_string();
        tracing::warn!(
            request_id = %ctx.request_id(),
            error = %body,
            "Origin fetch failed, responding 500"
        );

        let write_result: Result<()> = async {
            let mut resp = ResponseHeader::build(500, None)?;
            resp.insert_header("content-type", "text/plain")?;
            resp.insert_header("content-length", body.len().to_string())?;
            session.write_response_header(Box::new(resp), false).await?;
            session
                .write_response_body(Some(Bytes::from(body.clone())), true)
                .await?;
            Ok(())
        }
        .await;

        if let Err(write_err) = write_result {
            tracing::debug!(error = %write_err, "Failed to write error response to client");
        } else {
            ctx.body_bytes_sent = body.len() as u64;
        }

        FailToProxy {
            error_code: 500,
            can_reuse_downstream: false,
        }
    }

    /// One access-log record per completed request
    async fn logging(
        &self,
        session: &mut Session,
        _e: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let status = session
            .response_written()
            .map(|resp| resp.status.as_u16())
            .unwrap_or(500);

        let protocol = match session.req_header().version {
            http::Version::HTTP_10 => "HTTP/1.0",
            http::Version::HTTP_2 => "HTTP/2.0",
            _ => "HTTP/1.1",
        };

        let record = AccessRecord {
            client_addr: self.get_client_ip(session),
            time: Local::now(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            protocol: protocol.to_string(),
            status,
            body_bytes: ctx.body_bytes_sent,
            cache_verdict: ctx.cache_verdict.to_string(),
            lookup_verdict: ctx.lookup_verdict.to_string(),
            user_agent: ctx.user_agent.clone().unwrap_or_else(|| "-".to_string()),
        };
        self.access_log.record(&record);
    }
}
