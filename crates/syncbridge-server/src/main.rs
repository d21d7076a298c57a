// SyncBridge Server
// Standalone host for the sync scheduler and the webhook gateway
//
// Run with: cargo run --bin syncbridge-server
// Configuration comes from SYNCBRIDGE_* environment variables (a .env file is loaded first).

use std::net::SocketAddr;
use std::sync::Arc;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use syncbridge_lib::services::{DeliverySink, GatewayServer, HttpSink, LogSink};
use syncbridge_lib::{EngineConfig, SqliteStore, SyncEngine};

fn print_help() {
    println!("syncbridge-server {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    syncbridge-server [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print this help");
    println!("    -v, --version    Print version");
    println!();
    println!("ENVIRONMENT:");
    println!("    SYNCBRIDGE_VAULT_KEY               Credential vault secret (required)");
    println!("    SYNCBRIDGE_DATABASE                SQLite file (default: syncbridge.db)");
    println!("    SYNCBRIDGE_BIND_ADDR               Gateway bind address (default: 127.0.0.1)");
    println!("    SYNCBRIDGE_PORT                    Gateway port (default: 9876)");
    println!("    SYNCBRIDGE_SINK_URL                Delivery URL template with {{destination}}");
    println!("    SYNCBRIDGE_TICK_SECS               Scheduler tick (default: 60)");
    println!("    SYNCBRIDGE_DEFAULT_INTERVAL_SECS   Fallback sync interval (default: 300)");
    println!("    SYNCBRIDGE_HTTP_TIMEOUT_SECS       Outbound request timeout (default: 30)");
    println!("    SYNCBRIDGE_MAX_ITEMS_PER_SYNC      Messages per sync (default: 10)");
    println!("    SYNCBRIDGE_FEED_BATCH_CAP          Messages per pushed feed (default: 5)");
    println!("    SYNCBRIDGE_MAX_BODY_BYTES          Hard request body cap (default: 5242880)");
    println!("    RUST_LOG                           Log filter (default: info)");
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("[server] Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("syncbridge-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            _ => {
                eprintln!("Unknown option: {}", arg);
                eprintln!("Use --help for usage information");
                std::process::exit(1);
            }
        }
    }

    // Missing .env is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env()?;

    let store = Arc::new(SqliteStore::open(&config.database_path)?);
    log::info!("[server] Database at {}", config.database_path.display());

    let sink: Arc<dyn DeliverySink> = match &config.sink_url {
        Some(url) => Arc::new(HttpSink::new(url.clone(), config.http_timeout())?),
        None => {
            log::info!("[server] SYNCBRIDGE_SINK_URL not set, messages will only be logged");
            Arc::new(LogSink)
        }
    };

    let addr = SocketAddr::new(config.bind_address, config.port);
    let mut engine = SyncEngine::new(config, store, sink)?;
    engine.init().await?;

    let server = GatewayServer::new();
    let bound = server.start(engine.mount_gateway()?, addr).await?;
    log::info!("[server] Accepting webhooks at http://{}/webhooks/{{id}}", bound);

    shutdown_signal().await;
    log::info!("[server] Shutting down");

    server.stop().await;
    engine.shutdown().await;
    Ok(())
}
