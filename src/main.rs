use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoloc::api::rate_limit::spawn_cleanup_task;
use autoloc::config::Config;
use autoloc::services::SystemClock;
use autoloc::storage::LocalImageStore;
use autoloc::AppState;

#[derive(Parser, Debug)]
#[command(name = "autoloc")]
#[command(author, version, about = "Car rental marketplace backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "autoloc.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Autoloc v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data and image directories exist
    for dir in [&config.server.data_dir, &config.storage.images_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    // Initialize database
    let db = autoloc::db::init(&config.server.data_dir).await?;

    let images = LocalImageStore::new(
        config.storage.images_dir.clone(),
        config.storage.public_url.clone(),
    );

    let mut state = AppState::new(
        config.clone(),
        db,
        Arc::new(images),
        Arc::new(SystemClock),
    );

    match autoloc::api::metrics::init_metrics() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "Metrics recorder not installed"),
    }

    let state = Arc::new(state);

    spawn_cleanup_task(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
    );

    // API routes plus the uploaded images under the public URL
    let app = autoloc::api::create_router(state.clone()).nest_service(
        &config.storage.public_url,
        ServeDir::new(&config.storage.images_dir),
    );

    let api_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind {}", api_addr))?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
