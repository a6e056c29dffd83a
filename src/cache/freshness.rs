//! Freshness evaluation over HTTP header values.
//!
//! Pure functions deciding, per request:
//! - whether the request may be answered from cache at all
//! - whether an origin response may be stored
//! - whether a stored entry is still fresh, stale-but-servable, or unusable
//!
//! The rules are deliberately narrower than RFC 7234: only `Cache-Control`
//! (`max-age`, `no-cache`, `no-store`, `private`) and `Pragma: no-cache`
//! participate. There is no validator-based revalidation and no `Vary`.

use super::entry::CacheEntry;

/// Parsed Cache-Control directives (the subset this proxy honors)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Freshness lifetime in seconds (max-age directive).
    /// `None` means "no explicit ceiling" and is distinct from `Some(0)`.
    pub max_age: Option<u64>,
    /// no-cache directive present
    pub no_cache: bool,
    /// no-store directive present
    pub no_store: bool,
    /// private directive present
    pub private: bool,
}

impl CacheControl {
    /// Parse a Cache-Control header value into structured directives.
    /// Comma-separated, case-insensitive; unknown directives are ignored,
    /// as is a `max-age` with an unparsable value.
    pub fn parse(header_value: &str) -> Self {
        let mut result = Self::default();

        for directive in header_value.split(',') {
            let directive = directive.trim().to_lowercase();
            if directive.is_empty() {
                continue;
            }

            if let Some((name, value)) = directive.split_once('=') {
                if name.trim() == "max-age" {
                    if let Ok(secs) = value.trim().trim_matches('"').parse::<u64>() {
                        result.max_age = Some(secs);
                    }
                }
            } else {
                match directive.as_str() {
                    "no-cache" => result.no_cache = true,
                    "no-store" => result.no_store = true,
                    "private" => result.private = true,
                    _ => {}
                }
            }
        }

        result
    }

    /// A directive set that forbids this shared cache from storing or
    /// serving the representation.
    fn forbids_caching(&self) -> bool {
        self.no_cache || self.no_store || self.private
    }
}

/// Extract the max-age ceiling from a Cache-Control header value.
/// Returns `None` when the header or the directive is absent.
pub fn compute_max_age(cache_control: Option<&str>) -> Option<u64> {
    cache_control.and_then(|v| CacheControl::parse(v).max_age)
}

/// Whether an origin response may be written to the cache.
/// Absence of any caching directive defaults to cacheable.
pub fn is_response_cacheable(cache_control: Option<&str>, pragma: Option<&str>) -> bool {
    if let Some(cc) = cache_control {
        if CacheControl::parse(cc).forbids_caching() {
            return false;
        }
    }
    if let Some(p) = pragma {
        if p.to_lowercase().contains("no-cache") {
            return false;
        }
    }
    true
}

/// Whether an inbound request may participate in caching at all.
/// Same directive rules as responses, plus only GET and HEAD qualify.
pub fn is_request_cacheable(method: &str, cache_control: Option<&str>, pragma: Option<&str>) -> bool {
    if method != "GET" && method != "HEAD" {
        return false;
    }
    is_response_cacheable(cache_control, pragma)
}

/// Whether an entry captured at `timestamp` has exceeded `ceiling` at `now`.
/// A `None` ceiling never expires by this check.
pub fn is_expired(timestamp: u64, now: u64, ceiling: Option<u64>) -> bool {
    match ceiling {
        Some(max_age) => now.saturating_sub(timestamp) > max_age,
        None => false,
    }
}

/// Outcome of evaluating a stored entry against a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No usable entry. Synchronous origin fetch; nothing is served stale.
    Miss,
    /// Entry is fresh. Serve directly, no refresh.
    Fresh,
    /// Entry is past its own lifetime but not rejected by the client.
    /// Serve immediately and refresh in the background.
    Stale,
}

impl Freshness {
    /// `x-cache` verdict for this outcome
    pub fn cache_verdict(&self) -> &'static str {
        match self {
            Freshness::Miss => "MISS",
            Freshness::Fresh => "HIT",
            Freshness::Stale => "HIT_STALE",
        }
    }

    /// `x-cache-lookup` verdict for this outcome
    pub fn lookup_verdict(&self) -> &'static str {
        match self {
            Freshness::Fresh => "HIT",
            _ => "MISS",
        }
    }

    /// Whether a background refresh must be scheduled after serving
    pub fn needs_refresh(&self) -> bool {
        matches!(self, Freshness::Stale)
    }

    /// Whether the stored entry may be written to the client
    pub fn is_servable(&self) -> bool {
        !matches!(self, Freshness::Miss)
    }
}

/// Decision combinator for a lookup result.
///
/// - no entry: `Miss`
/// - entry expired against the request's own `max-age`: `Miss`; the client
///   demanded fresher data, so the stale copy is not served
/// - entry expired against its own stored `max-age`: `Stale`
/// - otherwise: `Fresh`
pub fn evaluate(entry: Option<&CacheEntry>, request_cache_control: Option<&str>, now: u64) -> Freshness {
    let entry = match entry {
        Some(e) => e,
        None => return Freshness::Miss,
    };

    // Client-imposed staleness: the request's own ceiling can force an
    // earlier expiry than the entry's lifetime.
    if let Some(client_ceiling) = compute_max_age(request_cache_control) {
        if is_expired(entry.timestamp, now, Some(client_ceiling)) {
            return Freshness::Miss;
        }
    }

    // Origin-imposed staleness from the stored response's own directives
    let entry_ceiling = compute_max_age(entry.header("cache-control"));
    if is_expired(entry.timestamp, now, entry_ceiling) {
        return Freshness::Stale;
    }

    Freshness::Fresh
}
