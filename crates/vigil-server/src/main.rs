use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;
use vigil_store::{AlertStore, StoreOptions};

use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1).map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            eprintln!("Usage: vigil-server [config.toml]");
            return Ok(());
        }
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        retention_secs = config.retention_secs,
        "vigil-server starting"
    );

    let store = Arc::new(AlertStore::open(
        Path::new(&config.data_dir),
        StoreOptions {
            retention: ChronoDuration::seconds(config.retention_secs as i64),
        },
    )?);

    let state = AppState {
        store: store.clone(),
        start_time: Utc::now(),
        config: Arc::new(config.clone()),
    };

    // Periodic eviction task
    let eviction_store = store.clone();
    let eviction_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(config.eviction_interval_secs.max(1)));
        loop {
            tick.tick().await;
            let removed = eviction_store.evict();
            if removed > 0 {
                tracing::info!(removed, "Eviction removed recovered alerts past retention");
            }
        }
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    let http_server = axum::serve(http_listener, app);
    tokio::select! {
        result = http_server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    eviction_handle.abort();

    // Final flush so durable state matches the in-memory table at exit.
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Final alert store flush failed");
    }
    tracing::info!("Server stopped");

    Ok(())
}
