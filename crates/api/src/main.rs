use std::sync::Arc;

use anyhow::Context;

use bankstream_infra::AppConfig;
use bankstream_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bankstream_observability::init(LogFormat::from_env());

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(
        bankstream_api::app::build_services(&config)
            .await
            .context("failed to start ledger services")?,
    );
    let app = bankstream_api::app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
