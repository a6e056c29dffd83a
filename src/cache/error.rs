//! Cache error types
//!
//! This module defines error types for cache operations. Cache errors are
//! always recovered locally (treated as a miss or a failed best-effort
//! write); they never surface to a client.

/// Cache error types
#[derive(Debug)]
pub enum CacheError {
    /// I/O error (disk cache read/write/mkdir)
    Io(std::io::Error),
    /// Serialization/deserialization error (corrupt stored entry)
    Serialization(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "I/O error: {}", err),
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_implements_error_trait() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<CacheError>();
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::Serialization("bad msgpack".to_string());
        assert!(format!("{}", err).contains("bad msgpack"));
    }

    #[test]
    fn test_cache_error_converts_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let cache_err: CacheError = io_err.into();
        assert!(matches!(cache_err, CacheError::Io(_)));
    }
}
