// Error types module

use thiserror::Error;

/// Centralized error type for proxy startup and orchestration.
///
/// Cache-level failures use `cache::CacheError` and are always recovered
/// locally; this type covers errors that abort startup or a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Configuration errors (unreadable file, invalid YAML, missing fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Origin connectivity errors (connect refused, reset, timeout)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal proxy errors
    #[error("Internal error: {0}")]
    Internal(String),
}
