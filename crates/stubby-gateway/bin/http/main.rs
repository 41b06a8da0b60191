mod cli;

use crate::cli::{LogFormat, CLI};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use stubby_gateway::{App, AppState};
use stubby_generator::RandomGenerator;
use stubby_shortener::{ShortenerService, ShortenerSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        listen_addr = %config.listen_addr,
        storage_backend = %config.storage,
        max_attempts = config.max_attempts,
        serialize_creates = config.serialize_creates,
        "starting stubby"
    );

    let store = stubby_storage::connect(&config.store_config())
        .await
        .with_context(|| format!("failed to open {} store", config.storage))?;

    let generator = match config.seed {
        Some(seed) => RandomGenerator::seeded(seed),
        None => RandomGenerator::new(),
    };
    let settings = ShortenerSettings::builder()
        .max_attempts(config.max_attempts)
        .operation_timeout(config.operation_timeout())
        .serialize_creates(config.serialize_creates)
        .build();
    let service = ShortenerService::with_settings(Arc::clone(&store), generator, settings);
    let state = AppState::new(Arc::new(service), config.public_base_url());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(listen_addr = %listener.local_addr()?, "starting gateway server");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    store.close().await.context("failed to close store")?;
    info!("stubby stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
