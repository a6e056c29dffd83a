// Logging module - structured logging setup and the access log sink

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for structured logging.
///
/// Level filtering comes from `RUST_LOG` when set, defaulting to `info`.
/// Safe to call once at startup; a second call returns an error from the
/// global subscriber registry.
pub fn init_subscriber() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| e as Box<dyn Error>)
}

/// One completed request, ready for access-log formatting
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub client_addr: String,
    pub time: DateTime<Local>,
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub status: u16,
    pub body_bytes: u64,
    pub cache_verdict: String,
    pub lookup_verdict: String,
    pub user_agent: String,
}

impl AccessRecord {
    /// Common-log-style line with the cache verdict pair appended:
    /// `client - - [time] "METHOD path PROTO" status bytes CACHE:LOOKUP "ua"`
    pub fn format_line(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} {}\" {} {} {}:{} \"{}\"",
            self.client_addr,
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.path,
            self.protocol,
            self.status,
            self.body_bytes,
            self.cache_verdict,
            self.lookup_verdict,
            self.user_agent,
        )
    }
}

/// Append-only access log file sink. Write failures are logged through
/// tracing and never propagated to the request path.
pub struct AccessLog {
    file: Option<Mutex<File>>,
}

impl AccessLog {
    /// Open the configured log file in append mode. `None` disables the
    /// file sink; records then only reach the structured log.
    pub fn open(path: Option<&str>) -> Self {
        let file = path.and_then(|p| {
            match OpenOptions::new().create(true).append(true).open(p) {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    tracing::warn!(path = %p, error = %e, "Cannot open access log, file sink disabled");
                    None
                }
            }
        });
        Self { file }
    }

    /// Emit one record: a line to the file sink (when open) and a
    /// structured event for log aggregation.
    pub fn record(&self, record: &AccessRecord) {
        if let Some(file) = &self.file {
            let line = record.format_line();
            let mut f = file.lock();
            if let Err(e) = writeln!(f, "{}", line) {
                tracing::warn!(error = %e, "Access log write failed");
            }
        }

        tracing::info!(
            client = %record.client_addr,
            method = %record.method,
            path = %record.path,
            protocol = %record.protocol,
            status = record.status,
            bytes = record.body_bytes,
            cache = %record.cache_verdict,
            lookup = %record.lookup_verdict,
            user_agent = %record.user_agent,
            "Request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> AccessRecord {
        AccessRecord {
            client_addr: "10.0.0.5".to_string(),
            time: Local.timestamp_opt(1_700_000_000, 0).unwrap(),
            method: "GET".to_string(),
            path: "/assets/app.js".to_string(),
            protocol: "HTTP/1.1".to_string(),
            status: 200,
            body_bytes: 512,
            cache_verdict: "HIT".to_string(),
            lookup_verdict: "HIT".to_string(),
            user_agent: "curl/8.0".to_string(),
        }
    }

    #[test]
    fn test_format_line_shape() {
        let line = record().format_line();
        assert!(line.starts_with("10.0.0.5 - - ["));
        assert!(line.contains("\"GET /assets/app.js HTTP/1.1\""));
        assert!(line.contains(" 200 512 HIT:HIT "));
        assert!(line.ends_with("\"curl/8.0\""));
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("access.log");
        let log = AccessLog::open(path.to_str());

        log.record(&record());
        log.record(&record());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_disabled_sink_does_not_panic() {
        let log = AccessLog::open(None);
        log.record(&record());
    }

    #[test]
    fn test_unwritable_path_degrades_gracefully() {
        let log = AccessLog::open(Some("/nonexistent-dir/access.log"));
        log.record(&record());
    }
}
