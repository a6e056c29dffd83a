// End-to-end tests for the proxy surface
//
// Spawns the real binary against a local stub origin and drives it over
// HTTP, asserting the cache diagnostic headers across the miss, hit and
// stale-serve phases. Cache commits happen on detached tasks, so phase
// transitions are observed by polling rather than asserted on the very
// next request.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

const PROXY_NAME: &str = "edge-test";

/// Per-path request counters for the stub origin
#[derive(Default)]
struct OriginCounters {
    fresh: AtomicUsize,
    stale: AtomicUsize,
}

/// Minimal single-threaded HTTP origin. `/fresh` responds with a long
/// max-age, `/stale` with max-age=0 so the cached copy goes stale after
/// one second. Every served request bumps the path's counter.
fn spawn_stub_origin() -> (u16, Arc<OriginCounters>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let counters = Arc::new(OriginCounters::default());

    let thread_counters = counters.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => handle_origin_request(stream, &thread_counters),
                Err(_) => break,
            }
        }
    });

    (port, counters)
}

fn handle_origin_request(mut stream: TcpStream, counters: &OriginCounters) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(clone) => clone,
        Err(_) => return,
    });

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    // Drain the request headers; the stub never reads a body
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line == "\r\n" => break,
            Ok(_) => {}
            Err(_) => return,
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (cache_control, body) = match path {
        "/fresh" => {
            counters.fresh.fetch_add(1, Ordering::SeqCst);
            ("max-age=300", "fresh payload")
        }
        "/stale" => {
            counters.stale.fetch_add(1, Ordering::SeqCst);
            ("max-age=0", "stale payload")
        }
        _ => ("no-store", "not found"),
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncache-control: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        cache_control,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A proxy process under test. Kills the child on drop.
struct ProxyUnderTest {
    process: Child,
    base_url: String,
    _config_dir: TempDir,
}

impl ProxyUnderTest {
    fn start(upstream_port: u16) -> Self {
        let port = free_port();
        let config_dir = TempDir::new().unwrap();
        let config_path = config_dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            format!(
                "server:\n  address: 127.0.0.1\n  port: {}\n  name: {}\nupstream:\n  host: 127.0.0.1\n  port: {}\n  timeout_seconds: 5\n",
                port, PROXY_NAME, upstream_port
            ),
        )
        .unwrap();

        let process = Command::new(env!("CARGO_BIN_EXE_kagemusha"))
            .arg("--config")
            .arg(&config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn proxy binary");

        let proxy = Self {
            process,
            base_url: format!("http://127.0.0.1:{}", port),
            _config_dir: config_dir,
        };
        proxy.wait_until_ready(port);
        proxy
    }

    fn wait_until_ready(&self, port: u16) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if TcpStream::connect(("127.0.0.1", port)).is_ok() {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
        panic!("proxy did not start listening on port {}", port);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for ProxyUnderTest {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn header<'a>(response: &'a reqwest::blocking::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[test]
fn test_miss_then_hit_then_stale_serve_with_diagnostic_headers() {
    let (origin_port, counters) = spawn_stub_origin();
    let proxy = ProxyUnderTest::start(origin_port);
    let client = client();

    // Phase 1: cold cache, the request is forwarded to the origin
    let response = client.get(proxy.url("/fresh")).send().unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(header(&response, "x-cache"), format!("MISS from {}", PROXY_NAME));
    assert_eq!(
        header(&response, "x-cache-lookup"),
        format!("MISS from {}", PROXY_NAME)
    );
    assert_eq!(header(&response, "age"), "0");
    assert_eq!(response.text().unwrap(), "fresh payload");
    assert_eq!(counters.fresh.load(Ordering::SeqCst), 1);

    // Phase 2: the captured entry is committed on a detached task, so
    // poll until a lookup lands on it
    let mut saw_hit = false;
    for _ in 0..20 {
        let response = client.get(proxy.url("/fresh")).send().unwrap();
        if header(&response, "x-cache") == format!("HIT from {}", PROXY_NAME) {
            assert_eq!(
                header(&response, "x-cache-lookup"),
                format!("HIT from {}", PROXY_NAME)
            );
            assert_eq!(response.text().unwrap(), "fresh payload");
            saw_hit = true;
            break;
        }
        thread::sleep(Duration::from_millis(200));
    }
    assert!(saw_hit, "cached entry was never served");

    // A fresh hit never touches the origin
    let served_so_far = counters.fresh.load(Ordering::SeqCst);
    let response = client.get(proxy.url("/fresh")).send().unwrap();
    assert_eq!(header(&response, "x-cache"), format!("HIT from {}", PROXY_NAME));
    assert_eq!(counters.fresh.load(Ordering::SeqCst), served_so_far);

    // Phase 3: max-age=0 entry goes stale one second after capture and is
    // served anyway, flagged, while a background refresh hits the origin
    let response = client.get(proxy.url("/stale")).send().unwrap();
    assert_eq!(header(&response, "x-cache"), format!("MISS from {}", PROXY_NAME));

    let mut before_stale_serve = 0;
    let mut saw_stale = false;
    for _ in 0..10 {
        thread::sleep(Duration::from_millis(1200));
        before_stale_serve = counters.stale.load(Ordering::SeqCst);
        let response = client.get(proxy.url("/stale")).send().unwrap();
        if header(&response, "x-cache") == format!("HIT_STALE from {}", PROXY_NAME) {
            // Stale entries fail the lookup while still being served
            assert_eq!(
                header(&response, "x-cache-lookup"),
                format!("MISS from {}", PROXY_NAME)
            );
            assert_eq!(header(&response, "warning"), "110 Response is stale");
            assert_eq!(header(&response, "via"), format!("1.1 {}", PROXY_NAME));
            assert_ne!(header(&response, "age"), "0");
            assert_eq!(response.text().unwrap(), "stale payload");
            saw_stale = true;
            break;
        }
    }
    assert!(saw_stale, "stale entry was never served");

    // The stale serve itself bypassed the origin; any counter movement
    // from here is the detached refresh landing
    let deadline = Instant::now() + Duration::from_secs(5);
    while counters.stale.load(Ordering::SeqCst) <= before_stale_serve {
        assert!(
            Instant::now() < deadline,
            "background refresh never reached the origin"
        );
        thread::sleep(Duration::from_millis(100));
    }
}

#[test]
fn test_unreachable_origin_yields_500_with_error_body() {
    // Bind and drop to get a port with nothing listening on it
    let dead_port = free_port();
    let proxy = ProxyUnderTest::start(dead_port);

    let response = client().get(proxy.url("/anything")).send().unwrap();
    assert_eq!(response.status().as_u16(), 500);
    assert!(!response.text().unwrap().is_empty());
}
