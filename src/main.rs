use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use pingora_core::services::background::background_service;
use std::path::PathBuf;
use std::sync::Arc;

use kagemusha::config::Config;
use kagemusha::logging::AccessLog;
use kagemusha::proxy::KagemushaProxy;
use kagemusha::server::CacheMaintenance;

/// Kagemusha - Caching reverse proxy built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "kagemusha")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

fn main() {
    // Initialize logging subsystem
    kagemusha::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration from file
    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        upstream = %format!("{}:{}", config.upstream.host, config.upstream.port),
        disk_cache = config.cache.disk.enabled,
        "Configuration loaded successfully"
    );

    // Build Pingora server options
    let opt = Opt {
        daemon: args.daemon,
        test: args.test,
        upgrade: args.upgrade,
        ..Default::default()
    };

    // Create Pingora server
    let mut server = Server::new(Some(opt)).expect("Failed to create Pingora server");
    server.bootstrap();

    // Shared tiered cache and access log
    let cache = Arc::new(config.cache.build());
    let access_log = Arc::new(AccessLog::open(config.access_log.path.as_deref()));

    // Periodic memory sweep runs beside the proxy workers
    let maintenance = background_service(
        "cache maintenance",
        CacheMaintenance::new(cache.clone(), config.cache.memory.sweep_interval_seconds),
    );

    // Create proxy instance and HTTP proxy service
    let listen_addr = format!("{}:{}", config.server.address, config.server.port);
    let proxy = KagemushaProxy::new(config, cache, access_log);
    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(
        address = %listen_addr,
        "Starting Kagemusha caching proxy"
    );

    // Register services with server
    server.add_service(proxy_service);
    server.add_service(maintenance);

    // Run server forever (blocks until shutdown)
    server.run_forever();
}
