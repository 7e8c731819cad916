use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use mediaconv_api::app::{build_app, AppServices};
use mediaconv_infra::{Config, LogFormat};
use mediaconv_observability::Format;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let format = match config.log_format {
        LogFormat::Json => Format::Json,
        LogFormat::Pretty => Format::Pretty,
    };
    mediaconv_observability::init_with(&config.log_level, format);

    let services = Arc::new(AppServices::from_config(&config).await?);
    let consumer = services.spawn_consumer();

    let app = build_app(services);
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;

    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("http server stopped; draining queue consumer");
    consumer.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
